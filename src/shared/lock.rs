use anyhow::{Context, Result};
use fs2::FileExt;
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

// Exclusive claim on one receiver, held through an OS file lock until dropped.
// The holder's PID is written into the file for whoever finds it locked.
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("creating lock directory failed: {}", parent.display())
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("opening lock file failed: {}", path.display()))?;

        file.try_lock_exclusive().with_context(|| {
            let holder = fs::read_to_string(path).unwrap_or_default();
            format!(
                "receiver is already owned by another process (pid {}): {}",
                holder.trim(),
                path.display()
            )
        })?;

        file.set_len(0)
            .and_then(|()| writeln!(file, "{}", process::id()))
            .with_context(|| format!("writing lock owner failed: {}", path.display()))?;
        debug!("claimed receiver lock {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!("released receiver lock {}", self.path.display());
    }
}

// One lock per serial device, so receivers on different ports never contend.
pub fn lock_path_for_port(dir: &Path, port: &str) -> PathBuf {
    let name: String = port
        .trim_start_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    dir.join(format!("pigeond-{name}.lock"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn second_acquire_fails_until_release() {
        let path = lock_path_for_port(&env::temp_dir(), &format!("/dev/test{}", process::id()));
        let first = LockGuard::acquire(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap().trim(),
            process::id().to_string()
        );

        let err = LockGuard::acquire(&path).err().unwrap();
        assert!(format!("{err:#}").contains("already owned"));
        drop(first);
        assert!(LockGuard::acquire(&path).is_ok());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn lock_names_follow_the_port() {
        let dir = Path::new("/run/pigeond");
        assert_eq!(
            lock_path_for_port(dir, "/dev/ttyHS0"),
            dir.join("pigeond-dev_ttyHS0.lock")
        );
        assert_ne!(
            lock_path_for_port(dir, "/dev/ttyACM0"),
            lock_path_for_port(dir, "/dev/ttyACM1")
        );
    }
}
