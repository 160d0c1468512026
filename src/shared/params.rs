use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const ASSIST_TOKEN_KEY: &str = "AssistNowToken";
pub const IS_ONROAD_KEY: &str = "IsOnroad";

// File-per-key parameter store shared with the rest of the system.
pub struct Params {
    root: PathBuf,
}

impl Params {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    // Missing keys read as `None`; values are trimmed of trailing whitespace.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.root.join(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value.trim_end().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("reading param failed: {}", path.display()))
            }
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some_and(|value| value == "1"))
    }

    // Write through a temporary file so readers never observe a partial value.
    pub fn put_bool(&self, key: &str, value: bool) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating params directory failed: {}", self.root.display()))?;
        let path = self.root.join(key);
        let tmp = self.root.join(format!(".{key}.tmp"));
        fs::write(&tmp, if value { "1" } else { "0" })
            .with_context(|| format!("writing param failed: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("replacing param failed: {}", path.display()))?;
        Ok(())
    }

    // Force a flag for the lifetime of the returned guard, then put back its prior value.
    pub fn override_bool(&self, key: &'static str, value: bool) -> Result<BoolOverride<'_>> {
        let prior = self.get_bool(key)?;
        self.put_bool(key, value)?;
        Ok(BoolOverride {
            params: self,
            key,
            prior,
        })
    }
}

pub struct BoolOverride<'a> {
    params: &'a Params,
    key: &'static str,
    prior: bool,
}

impl Drop for BoolOverride<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.params.put_bool(self.key, self.prior) {
            warn!("restoring {} failed: {err:#}", self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::process;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("pigeond-params-{}-{name}", process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_keys_read_as_absent() {
        let params = Params::new(&scratch_dir("missing"));
        assert_eq!(params.get(ASSIST_TOKEN_KEY).unwrap(), None);
        assert!(!params.get_bool(IS_ONROAD_KEY).unwrap());
    }

    #[test]
    fn values_are_trimmed() {
        let dir = scratch_dir("trimmed");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(ASSIST_TOKEN_KEY), "abc123\n").unwrap();

        let params = Params::new(&dir);
        assert_eq!(params.get(ASSIST_TOKEN_KEY).unwrap().as_deref(), Some("abc123"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn override_restores_prior_value() {
        let dir = scratch_dir("override");
        let params = Params::new(&dir);
        params.put_bool(IS_ONROAD_KEY, true).unwrap();

        {
            let _guard = params.override_bool(IS_ONROAD_KEY, false).unwrap();
            assert!(!params.get_bool(IS_ONROAD_KEY).unwrap());
        }
        assert!(params.get_bool(IS_ONROAD_KEY).unwrap());
        let _ = fs::remove_dir_all(&dir);
    }
}
