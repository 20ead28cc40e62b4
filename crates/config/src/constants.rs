//! Fixed locations inside a target root
//!
//! All paths are relative to the root being managed. They follow the apk
//! database layout and are deliberately not configurable.

pub const ETC_APK_DIR: &str = "etc/apk";
pub const KEYS_DIR: &str = "etc/apk/keys";
pub const WORLD_FILE: &str = "etc/apk/world";
pub const REPOSITORIES_FILE: &str = "etc/apk/repositories";
pub const ARCH_FILE: &str = "etc/apk/arch";

/// Canonical home of the package database
pub const APK_DIR: &str = "usr/lib/apk";
pub const DB_DIR: &str = "usr/lib/apk/db";
pub const INSTALLED_DB: &str = "usr/lib/apk/db/installed";
pub const SCRIPTS_TAR: &str = "usr/lib/apk/db/scripts.tar";
pub const TRIGGERS_FILE: &str = "usr/lib/apk/db/triggers";
pub const LOCK_FILE: &str = "usr/lib/apk/db/lock";

/// Legacy location that must resolve to [`APK_DIR`]
pub const LEGACY_APK_DIR: &str = "lib/apk";
/// Target of the `lib/apk` symlink, relative to `lib`
pub const LEGACY_APK_LINK_TARGET: &str = "../usr/lib/apk";

/// Directories created when a root is initialized, with their modes
pub const INIT_DIRECTORIES: &[(&str, u32)] = &[
    ("etc", 0o755),
    ("etc/apk", 0o755),
    ("etc/apk/keys", 0o755),
    ("usr", 0o755),
    ("usr/lib", 0o755),
    ("usr/lib/apk", 0o755),
    ("usr/lib/apk/db", 0o755),
    ("usr/lib/apk/exec", 0o755),
    ("var", 0o755),
    ("var/cache", 0o755),
    ("var/cache/apk", 0o755),
    ("var/cache/misc", 0o755),
];

/// Files created when a root is initialized: path, mode, initial contents
pub const INIT_FILES: &[(&str, u32, &[u8])] = &[
    (WORLD_FILE, 0o644, b"\n"),
    (REPOSITORIES_FILE, 0o644, b"\n"),
    (LOCK_FILE, 0o600, b""),
    (TRIGGERS_FILE, 0o644, b""),
    (INSTALLED_DB, 0o644, b""),
];
