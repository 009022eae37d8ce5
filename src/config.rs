use anyhow::{Context, Result, bail};
use global_hotkey::hotkey::HotKey;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Flat configuration record, persisted as `config.json`.
///
/// Loaded once at startup and immutable for the process lifetime. All fields
/// are strings; keybinds use the `global-hotkey` combo syntax
/// (e.g. `ctrl+shift+s`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub username: String,
    pub duty_reason: String,
    pub keybind_start_end: String,
    pub keybind_proof: String,
    pub imgur_client_id: String,
}

impl Config {
    /// Validate every field up front and aggregate all problems into a single
    /// error, so a misconfigured file fails at load time rather than on first
    /// access.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        for (field, value) in [
            ("username", &self.username),
            ("duty_reason", &self.duty_reason),
            ("imgur_client_id", &self.imgur_client_id),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{field} must not be empty"));
            }
        }

        for (field, combo) in [
            ("keybind_start_end", &self.keybind_start_end),
            ("keybind_proof", &self.keybind_proof),
        ] {
            if let Err(err) = combo.parse::<HotKey>() {
                problems.push(format!("{field} ({combo:?}) is not a valid hotkey: {err}"));
            }
        }

        if self.keybind_start_end.parse::<HotKey>().ok().map(|k| k.id())
            == self.keybind_proof.parse::<HotKey>().ok().map(|k| k.id())
            && problems.is_empty()
        {
            problems.push("keybind_start_end and keybind_proof must differ".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            bail!("invalid configuration: {}", problems.join("; "))
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

/// Load the configuration, falling back to interactive first-run setup when the
/// file does not exist yet.
pub fn load_or_init(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        let stdin = io::stdin();
        init_config(&mut stdin.lock(), path)
    }
}

/// First-run setup: prompt for the answers and validate them before anything
/// is persisted, so a mistyped keybind never poisons `config.json`.
pub fn init_config(input: &mut impl BufRead, path: &Path) -> Result<Config> {
    let config = first_time_setup(input)?;
    config
        .validate()
        .context("setup answers are invalid; config was not saved")?;
    config.save(path)?;
    println!(
        "Config saved to {}. You can edit this file to change settings.",
        path.display()
    );
    Ok(config)
}

/// Interactive first-run setup. Reads answers line by line from `input` so
/// tests can drive it without a terminal.
pub fn first_time_setup(input: &mut impl BufRead) -> Result<Config> {
    println!("First time setup:");
    Ok(Config {
        username: prompt(input, "Enter your username")?,
        duty_reason: prompt(input, "Enter your preferred duty state reason")?,
        keybind_start_end: prompt(
            input,
            "Enter keybind for duty state start/end (e.g., ctrl+shift+s)",
        )?,
        keybind_proof: prompt(
            input,
            "Enter keybind for duty proof screenshot (e.g., ctrl+shift+p)",
        )?,
        imgur_client_id: prompt(
            input,
            "Enter your Imgur Client ID (get from https://api.imgur.com/oauth2/addclient)",
        )?,
    })
}

fn prompt(input: &mut impl BufRead, label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("failed to read setup answer")?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::{Config, first_time_setup};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn sample_config() -> Config {
        Config {
            username: "officer_nine".to_string(),
            duty_reason: "On patrol".to_string(),
            keybind_start_end: "ctrl+shift+s".to_string(),
            keybind_proof: "ctrl+shift+p".to_string(),
            imgur_client_id: "abc123".to_string(),
        }
    }

    #[test]
    fn save_then_load_round_trips_all_fields() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        let config = sample_config();

        config.save(&path).expect("save succeeds");
        let loaded = Config::load(&path).expect("load succeeds");

        assert_eq!(loaded, config);
    }

    #[test]
    fn setup_answers_become_config_fields() {
        let mut input = Cursor::new("officer_nine\nOn patrol\nctrl+shift+s\nctrl+shift+p\nabc123\n");
        let config = first_time_setup(&mut input).expect("setup succeeds");
        assert_eq!(config, sample_config());
    }

    #[test]
    fn invalid_setup_answers_are_not_persisted() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        let mut input =
            Cursor::new("officer_nine\nOn patrol\nnot a keybind at all\nctrl+shift+p\nabc123\n");

        let err = super::init_config(&mut input, &path).expect_err("invalid keybind rejected");
        assert!(
            format!("{err:#}").contains("keybind_start_end"),
            "unexpected error: {err:#}"
        );
        assert!(!path.exists(), "config.json must not be written");
    }

    #[test]
    fn valid_setup_answers_are_persisted() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        let mut input = Cursor::new("officer_nine\nOn patrol\nctrl+shift+s\nctrl+shift+p\nabc123\n");

        let config = super::init_config(&mut input, &path).expect("setup succeeds");
        let reloaded = Config::load(&path).expect("load saved config");
        assert_eq!(reloaded, config);
    }

    #[test]
    fn valid_config_passes_validation() {
        sample_config().validate().expect("valid config");
    }

    #[test]
    fn validation_aggregates_all_problems() {
        let config = Config {
            username: "  ".to_string(),
            duty_reason: "On patrol".to_string(),
            keybind_start_end: "ctrl+shift+s".to_string(),
            keybind_proof: "not a keybind at all".to_string(),
            imgur_client_id: String::new(),
        };

        let err = config.validate().expect_err("invalid config");
        let message = err.to_string();
        assert!(message.contains("username"), "missing username in {message}");
        assert!(
            message.contains("keybind_proof"),
            "missing keybind_proof in {message}"
        );
        assert!(
            message.contains("imgur_client_id"),
            "missing imgur_client_id in {message}"
        );
    }

    #[test]
    fn identical_keybinds_are_rejected() {
        let mut config = sample_config();
        config.keybind_proof = config.keybind_start_end.clone();
        let err = config.validate().expect_err("identical keybinds");
        assert!(err.to_string().contains("must differ"));
    }
}
