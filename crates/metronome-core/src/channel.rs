use std::path::{Path, PathBuf};

use thiserror::Error;

/// Derives the channel name for a binary directory, optionally suffixed with
/// an instance name. Path separators and drive colons are flattened to `_`
/// so the result is a single IPC-safe token. Deterministic: two processes
/// launched from the same directory with the same instance name contend for
/// the same channel, and distinct directories never collide.
pub fn channel_name(binary_dir: &Path, instance: Option<&str>) -> String {
    let flat: String = binary_dir
        .to_string_lossy()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect();

    match instance {
        Some(name) if !name.is_empty() => format!("{flat}-{name}"),
        _ => flat,
    }
}

/// Concrete filesystem addresses for one channel under a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPaths {
    pub name: String,
    pub base_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub config_file: PathBuf,
}

pub fn resolve_paths(base_dir: &Path, name: &str) -> ChannelPaths {
    ChannelPaths {
        name: name.to_owned(),
        base_dir: base_dir.to_path_buf(),
        socket_path: base_dir.join(format!("{name}.sock")),
        lock_path: base_dir.join(format!("{name}.lock")),
        config_file: base_dir.join("config.toml"),
    }
}

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("channel already claimed: {name}")]
    AlreadyRunning { name: String },
    #[error("claim channel {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_flattens_separators_and_colons() {
        let got = channel_name(Path::new("/opt/sched/bin"), None);
        assert_eq!(got, "_opt_sched_bin");

        let got = channel_name(Path::new("C:\\sched\\bin"), None);
        assert_eq!(got, "C__sched_bin");
    }

    #[test]
    fn instance_suffix_is_appended() {
        let got = channel_name(Path::new("/opt/sched"), Some("alpha"));
        assert_eq!(got, "_opt_sched-alpha");
    }

    #[test]
    fn empty_instance_is_ignored() {
        let plain = channel_name(Path::new("/opt/sched"), None);
        let empty = channel_name(Path::new("/opt/sched"), Some(""));
        assert_eq!(plain, empty);
    }

    #[test]
    fn same_inputs_same_name() {
        let a = channel_name(Path::new("/opt/sched"), Some("x"));
        let b = channel_name(Path::new("/opt/sched"), Some("x"));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_dirs_or_instances_never_collide() {
        let base = channel_name(Path::new("/opt/sched"), None);
        assert_ne!(base, channel_name(Path::new("/opt/other"), None));
        assert_ne!(base, channel_name(Path::new("/opt/sched"), Some("alpha")));
        assert_ne!(
            channel_name(Path::new("/opt/sched"), Some("alpha")),
            channel_name(Path::new("/opt/sched"), Some("beta")),
        );
    }

    #[test]
    fn resolve_paths_places_files_under_base_dir() {
        let got = resolve_paths(Path::new("/home/alice/.metronome"), "_opt_sched");
        assert_eq!(got.name, "_opt_sched");
        assert_eq!(
            got.socket_path,
            PathBuf::from("/home/alice/.metronome/_opt_sched.sock")
        );
        assert_eq!(
            got.lock_path,
            PathBuf::from("/home/alice/.metronome/_opt_sched.lock")
        );
        assert_eq!(
            got.config_file,
            PathBuf::from("/home/alice/.metronome/config.toml")
        );
    }
}
