// Daybook - Environment Configuration Loader
// Loads connection settings from .env file if present

use std::env;

pub struct EnvConfig {
    pub supabase_connection_string: Option<String>,
    pub enrichment_base_url: Option<String>,
    pub enrichment_bearer_token: Option<String>,
    /// Override for the watcher's fast poll cadence, in milliseconds
    pub poll_interval_ms: Option<u64>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            supabase_connection_string: None,
            enrichment_base_url: None,
            enrichment_bearer_token: None,
            poll_interval_ms: None,
        }
    }
}

impl EnvConfig {
    /// Load environment configuration from .env file
    pub fn load() -> Self {
        // Try to load .env from project root
        let _ = dotenvy::dotenv();

        // Also try from user's home directory
        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".daybook").join(".env");
            if home_env.exists() {
                let _ = dotenvy::from_path(home_env);
            }
        }

        Self {
            supabase_connection_string: env::var("SUPABASE_CONNECTION_STRING")
                .ok()
                .filter(|s| !s.is_empty()),
            enrichment_base_url: env::var("DAYBOOK_ENRICHMENT_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            enrichment_bearer_token: env::var("DAYBOOK_ENRICHMENT_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            poll_interval_ms: env::var("DAYBOOK_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Save current environment to ~/.daybook/.env
    pub fn save_to_home(&self) -> Result<(), Box<dyn std::error::Error>> {
        use std::fs;
        use std::io::Write;

        let home = dirs::home_dir().ok_or("Could not find home directory")?;
        let config_dir = home.join(".daybook");
        fs::create_dir_all(&config_dir)?;

        let env_path = config_dir.join(".env");
        let mut file = fs::File::create(env_path)?;

        writeln!(file, "# Daybook - User Configuration")?;
        writeln!(file, "# Auto-generated - Edit these values as needed\n")?;

        if let Some(ref val) = self.supabase_connection_string {
            writeln!(file, "SUPABASE_CONNECTION_STRING={}", val)?;
        }
        if let Some(ref val) = self.enrichment_base_url {
            writeln!(file, "DAYBOOK_ENRICHMENT_URL={}", val)?;
        }
        if let Some(ref val) = self.enrichment_bearer_token {
            writeln!(file, "DAYBOOK_ENRICHMENT_TOKEN={}", val)?;
        }
        if let Some(val) = self.poll_interval_ms {
            writeln!(file, "DAYBOOK_POLL_INTERVAL_MS={}", val)?;
        }

        Ok(())
    }
}
