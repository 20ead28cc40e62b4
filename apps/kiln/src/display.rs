//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use kiln_config::ColorChoice;
use kiln_ops::{InstallReport, OperationResult, PackageSummary};
use std::io;

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    color_choice: ColorChoice,
    term: Term,
}

impl OutputRenderer {
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
            term: Term::stdout(),
        }
    }

    /// Render operation result
    pub fn render_result(&self, result: &OperationResult) -> io::Result<()> {
        if self.json_output {
            self.render_json(result)
        } else {
            self.render_table(result)
        }
    }

    fn render_json(&self, result: &OperationResult) -> io::Result<()> {
        let json = result.to_json().map_err(io::Error::other)?;
        self.term.write_line(&json)
    }

    fn render_table(&self, result: &OperationResult) -> io::Result<()> {
        match result {
            OperationResult::Initialized { root, arch } => {
                self.term
                    .write_line(&format!("Initialized {} for {arch}", self.bold(root)))
            }
            OperationResult::InstallReport(report) => self.render_install_report(report),
            OperationResult::Fetched(packages) => {
                if packages.is_empty() {
                    return self.term.write_line("Nothing to fetch.");
                }
                self.term
                    .write_line(&format!("Fetched {} packages", packages.len()))?;
                self.render_packages(packages)
            }
            OperationResult::PackageList(packages) => {
                if packages.is_empty() {
                    return self.term.write_line("No packages installed.");
                }
                self.render_packages(packages)
            }
        }
    }

    fn render_install_report(&self, report: &InstallReport) -> io::Result<()> {
        if report.packages.is_empty() {
            self.term.write_line("World is empty; nothing installed.")?;
        } else {
            self.term.write_line(&format!(
                "World satisfied by {} packages",
                report.packages.len()
            ))?;
            self.render_packages(&report.packages)?;
        }
        self.term
            .write_line(&format!("Database location: {}", report.db_location))
    }

    fn render_packages(&self, packages: &[PackageSummary]) -> io::Result<()> {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Arch").add_attribute(Attribute::Bold),
            Cell::new("Checksum").add_attribute(Attribute::Bold),
        ]);

        for package in packages {
            let name = if self.supports_color() {
                Cell::new(&package.name).fg(Color::Green)
            } else {
                Cell::new(&package.name)
            };
            table.add_row(vec![
                name,
                Cell::new(&package.version),
                Cell::new(&package.arch),
                Cell::new(&package.checksum),
            ]);
        }

        self.term.write_line(&table.to_string())
    }

    fn bold(&self, text: &str) -> String {
        if self.supports_color() {
            Style::new().bold().apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Check if color output is supported
    pub fn supports_color(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str) -> PackageSummary {
        PackageSummary {
            name: name.to_string(),
            version: "1.36.1-r2".to_string(),
            arch: "x86_64".to_string(),
            checksum: "Q1AAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
        }
    }

    #[test]
    fn explicit_color_choices_win() {
        assert!(OutputRenderer::new(false, ColorChoice::Always).supports_color());
        assert!(!OutputRenderer::new(false, ColorChoice::Never).supports_color());
    }

    #[test]
    fn renders_every_result_kind() {
        let renderer = OutputRenderer::new(false, ColorChoice::Never);
        let report = InstallReport {
            packages: vec![summary("busybox")],
            db_location: "linked".to_string(),
        };
        for result in [
            OperationResult::Initialized {
                root: "/tmp/root".to_string(),
                arch: "x86_64".to_string(),
            },
            OperationResult::InstallReport(report),
            OperationResult::Fetched(vec![]),
            OperationResult::PackageList(vec![summary("musl"), summary("busybox")]),
        ] {
            renderer.render_result(&result).unwrap();
        }
    }
}
