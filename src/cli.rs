use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about = "Loan dashboard HTTP backend", long_about = None)]
pub struct Cli {
    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    /// Port to listen on
    #[arg(long, default_value_t = 5000)]
    pub port: u16,
    /// SQLite database file backing the record collections
    #[arg(long, default_value = "loans.db")]
    pub database: PathBuf,
    /// Maximum CSV upload size in MiB
    #[arg(long, default_value_t = 10)]
    pub upload_limit_mib: usize,
}

impl Cli {
    pub fn upload_limit_bytes(&self) -> usize {
        self.upload_limit_mib * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_deployment() {
        let cli = Cli::parse_from(["loan-dashboard"]);
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 5000);
        assert_eq!(cli.upload_limit_mib, 10);
        assert_eq!(cli.upload_limit_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn overrides_are_accepted() {
        let cli = Cli::parse_from([
            "loan-dashboard",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--database",
            "/tmp/dash.db",
            "--upload-limit-mib",
            "25",
        ]);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.database, PathBuf::from("/tmp/dash.db"));
        assert_eq!(cli.upload_limit_mib, 25);
    }
}
