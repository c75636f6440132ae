use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "splittun")]
#[command(version, about = "Split-tunneling SOCKS5 proxy with an encrypted remote hop", long_about = None)]
pub struct Args {
    /// Path to the JSON configuration file (// line comments allowed)
    #[arg(long, default_value = "tunnel.json")]
    pub conf: String,

    /// Run the local role: SOCKS5 front-end + router + tunnel client
    #[arg(long, conflicts_with = "remote")]
    pub local: bool,

    /// Run the remote role: tunnel server + origin dialer
    #[arg(long, conflicts_with = "local")]
    pub remote: bool,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.local == self.remote {
            return Err("exactly one of --local or --remote must be set".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_neither_flag() {
        let args = Args {
            conf: "c.json".into(),
            local: false,
            remote: false,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_both_flags() {
        let args = Args {
            conf: "c.json".into(),
            local: true,
            remote: true,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn accepts_local_only() {
        let args = Args {
            conf: "c.json".into(),
            local: true,
            remote: false,
        };
        assert!(args.validate().is_ok());
    }
}
