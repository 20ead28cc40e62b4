//! Event handling and status display

use console::{Style, Term};
use kiln_events::{AppEvent, EventMessage, GeneralEvent, InstallEvent, InstallPhase, ResolverEvent};

use crate::logging::log_event_with_tracing;

/// How a status line is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Info,
    Success,
    Warning,
    Error,
}

/// Event handler for status lines and structured logs
pub struct EventHandler {
    colors_enabled: bool,
    json_mode: bool,
    debug_enabled: bool,
    term: Term,
}

impl EventHandler {
    pub fn new(colors_enabled: bool, json_mode: bool, debug_enabled: bool) -> Self {
        Self {
            colors_enabled,
            json_mode,
            debug_enabled,
            term: Term::stderr(),
        }
    }

    /// Log the event and, outside JSON mode, show its status line
    pub fn handle_event(&mut self, message: EventMessage) {
        log_event_with_tracing(&message);
        if self.json_mode {
            return;
        }
        if let Some((tone, line)) = status_line(&message.event, self.debug_enabled) {
            self.show(tone, &line);
        }
    }

    fn show(&self, tone: Tone, line: &str) {
        let line = if self.colors_enabled {
            let style = match tone {
                Tone::Info => Style::new(),
                Tone::Success => Style::new().green(),
                Tone::Warning => Style::new().yellow(),
                Tone::Error => Style::new().red().bold(),
            };
            style.apply_to(line).to_string()
        } else {
            line.to_string()
        };
        // stderr keeps stdout free for results
        let _ = self.term.write_line(&line);
    }
}

fn phase_name(phase: InstallPhase) -> &'static str {
    match phase {
        InstallPhase::Expand => "expand",
        InstallPhase::Apply => "apply",
        InstallPhase::Finalize => "finalize",
    }
}

/// The line shown for `event`, if any
fn status_line(event: &AppEvent, debug_enabled: bool) -> Option<(Tone, String)> {
    match event {
        AppEvent::Resolver(ResolverEvent::ResolutionStarted {
            world,
            repositories,
            ..
        }) => Some((
            Tone::Info,
            format!(
                "Resolving {} world entries against {repositories} repositories",
                world.len()
            ),
        )),
        AppEvent::Resolver(ResolverEvent::ResolutionCompleted { packages, .. }) => Some((
            Tone::Info,
            format!("Resolved {} packages", packages.len()),
        )),
        AppEvent::Resolver(ResolverEvent::PackageExcluded {
            package,
            missing_arch,
        }) => Some((
            Tone::Warning,
            format!("Skipping {package}: not available for {missing_arch}"),
        )),

        AppEvent::Install(InstallEvent::Started {
            package, version, ..
        }) => Some((Tone::Info, format!("Installing {package} {version}"))),
        AppEvent::Install(InstallEvent::Skipped { package, version }) if debug_enabled => Some((
            Tone::Info,
            format!("{package} {version} is already installed"),
        )),
        AppEvent::Install(InstallEvent::Failed {
            package,
            phase,
            failure,
        }) => Some((
            Tone::Error,
            format!(
                "Failed to {} {package}: {}",
                phase_name(*phase),
                failure.message
            ),
        )),
        AppEvent::Install(InstallEvent::BatchCompleted {
            installed, skipped, ..
        }) => Some((
            Tone::Success,
            format!("Installed {installed} packages ({skipped} already present)"),
        )),

        AppEvent::General(GeneralEvent::Warning { message, context }) => Some((
            Tone::Warning,
            match context {
                Some(context) => format!("Warning: {message} ({context})"),
                None => format!("Warning: {message}"),
            },
        )),
        AppEvent::General(GeneralEvent::Error { message, .. }) => {
            Some((Tone::Error, format!("Error: {message}")))
        }
        AppEvent::General(GeneralEvent::DebugLog { message, .. }) if debug_enabled => {
            Some((Tone::Info, message.clone()))
        }

        _ => None,
    }
}
