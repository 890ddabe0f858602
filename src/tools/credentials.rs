//! Ephemeral MySQL option file.
//!
//! Credentials are written to an owner-only temporary file and passed with
//! `--defaults-extra-file`, so the password never appears in a process
//! listing or in a logged command line. The file is removed on drop.

use std::io::Write;
use std::path::Path;

use secrecy::ExposeSecret;
use tempfile::NamedTempFile;

use crate::config::MysqlConfig;
use crate::exec::CommandSpec;
use crate::{Result, VaultError};

/// A `[client]` option file that lives as long as this value
pub struct CredentialsFile {
    file: NamedTempFile,
}

impl CredentialsFile {
    /// Write the option file with mode 0600
    pub fn create(mysql: &MysqlConfig) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("dbvault-client-")
            .suffix(".cnf")
            .tempfile()
            .map_err(|e| VaultError::Environment(format!("Failed to create credentials file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| VaultError::Environment(format!("Failed to restrict credentials file: {}", e)))?;
        }

        let contents = format!(
            "[client]\nuser={}\npassword={}\nhost={}\nport={}\n",
            quote(&mysql.user),
            quote(mysql.password.expose_secret()),
            quote(&mysql.host),
            mysql.port
        );
        file.write_all(contents.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| VaultError::Environment(format!("Failed to write credentials file: {}", e)))?;

        Ok(Self { file })
    }

    /// Path passed as `--defaults-extra-file`
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Start a MySQL-family command with this file as its first option
    pub fn command(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program).path_flag("--defaults-extra-file", self.path())
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn mysql() -> MysqlConfig {
        Config::from_lookup(|key| match key {
            "MYSQL_USER" => Some("backup".to_string()),
            "MYSQL_PASS" => Some("p\"a\\ss".to_string()),
            _ => None,
        })
        .unwrap()
        .mysql
    }

    #[test]
    fn test_file_contents_and_cleanup() {
        let creds = CredentialsFile::create(&mysql()).unwrap();
        let path = creds.path().to_path_buf();
        let contents = std::fs::read_to_string(&path).unwrap();

        assert!(contents.starts_with("[client]\n"));
        assert!(contents.contains("user=\"backup\""));
        assert!(contents.contains("password=\"p\\\"a\\\\ss\""));
        assert!(contents.contains("port=3306"));

        drop(creds);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let creds = CredentialsFile::create(&mysql()).unwrap();
        let mode = std::fs::metadata(creds.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_command_never_contains_password() {
        let creds = CredentialsFile::create(&mysql()).unwrap();
        let spec = creds.command("mysql").arg("-e").arg("FLUSH LOGS;");

        assert_eq!(spec.get_args()[0], format!("--defaults-extra-file={}", creds.path().display()));
        assert!(!spec.to_string().contains("a\\ss"));
    }
}
