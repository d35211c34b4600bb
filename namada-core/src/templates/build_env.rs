use super::{ConfigTemplate, MANAGED_HEADER};
use crate::config::BuildEnv;
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

/// `<root>/env`, sourced by the operator's interactive shells. No step reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvFile {
    pub env: BuildEnv,
    pub owner: String,
}

impl ConfigTemplate for BuildEnvFile {
    fn path(&self) -> PathBuf {
        self.env.root.join("env")
    }

    fn owner(&self) -> Option<(String, String)> {
        Some((self.owner.clone(), self.owner.clone()))
    }

    fn render(&self) -> Result<String> {
        Ok(format!(
            "{MANAGED_HEADER}export CARGO_HOME=\"{}\"\nexport RUSTUP_HOME=\"{}\"\nexport PATH=\"{}:$PATH\"\n",
            self.env.cargo_home.display(),
            self.env.rustup_home.display(),
            self.env.cargo_home.join("bin").display(),
        ))
    }
}

#[derive(Serialize)]
struct CargoConfigFile {
    net: NetSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<BuildSection>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct NetSection {
    git_fetch_with_cli: bool,
    retry: u32,
}

#[derive(Serialize)]
struct BuildSection {
    jobs: u32,
}

/// `<CARGO_HOME>/config.toml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoConfig {
    pub env: BuildEnv,
    pub owner: String,
    pub jobs: Option<u32>,
}

impl ConfigTemplate for CargoConfig {
    fn path(&self) -> PathBuf {
        self.env.cargo_home.join("config.toml")
    }

    fn owner(&self) -> Option<(String, String)> {
        Some((self.owner.clone(), self.owner.clone()))
    }

    fn render(&self) -> Result<String> {
        let file = CargoConfigFile {
            net: NetSection {
                git_fetch_with_cli: true,
                retry: 5,
            },
            build: self.jobs.map(|jobs| BuildSection { jobs }),
        };
        Ok(format!("{MANAGED_HEADER}{}", toml::to_string(&file)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildEnvConfig;

    #[test]
    fn env_file_exports_explicit_homes() {
        let t = BuildEnvFile {
            env: BuildEnvConfig::default().layout(),
            owner: "operator".into(),
        };
        assert_eq!(t.path(), PathBuf::from("/opt/namada-build/env"));
        let text = t.render().unwrap();
        assert!(text.contains("export CARGO_HOME=\"/opt/namada-build/cargo\"\n"));
        assert!(text.contains("export PATH=\"/opt/namada-build/cargo/bin:$PATH\"\n"));
    }

    #[test]
    fn cargo_config_is_valid_toml() {
        let t = CargoConfig {
            env: BuildEnvConfig::default().layout(),
            owner: "operator".into(),
            jobs: Some(4),
        };
        let text = t.render().unwrap();
        let parsed: toml::Value = toml::from_str(&text).unwrap();
        assert_eq!(parsed["net"]["git-fetch-with-cli"].as_bool(), Some(true));
        assert_eq!(parsed["build"]["jobs"].as_integer(), Some(4));

        let no_jobs = CargoConfig { jobs: None, ..t };
        assert!(!no_jobs.render().unwrap().contains("[build]"));
    }
}
