//! Configuração do gistcrawl carregada a partir de `gistcrawl.toml`.
//!
//! A struct [`CrawlerConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `GISTCRAWL_DATA_DIR` tem precedência sobre o arquivo;
//! flags da CLI têm precedência sobre ambos.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::CrawlError;
use crate::store::STATE_FILE_NAME;

pub const DEFAULT_CONFIG_FILE: &str = "gistcrawl.toml";
pub const DATA_DIR_ENV: &str = "GISTCRAWL_DATA_DIR";

/// Configuração de nível superior carregada de `gistcrawl.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Arquivo com uma URL de repositório por linha.
    #[serde(default = "default_queue_file")]
    pub queue_file: PathBuf,

    /// Diretório onde ficam os checkouts e os gists.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Caminho do arquivo de estado; padrão `<data_dir>/crawl-state.json`.
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Como o artefato é gerado.
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Seleção do gerador de artefatos (tabela `[generator]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorConfig {
    /// Digest nativo em texto puro.
    Digest {
        #[serde(default = "default_max_file_bytes")]
        max_file_bytes: u64,
        #[serde(default = "default_max_total_bytes")]
        max_total_bytes: u64,
    },
    /// Programa externo com placeholders `{url}`, `{source}` e `{output}`.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig::Digest {
            max_file_bytes: default_max_file_bytes(),
            max_total_bytes: default_max_total_bytes(),
        }
    }
}

// Valor padrão para a fila: "crawl-jobs.txt".
fn default_queue_file() -> PathBuf {
    PathBuf::from("crawl-jobs.txt")
}

// Valor padrão para o diretório de dados: "data".
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

// 1 MiB por arquivo.
fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

// 50 MiB por digest.
fn default_max_total_bytes() -> u64 {
    50 * 1024 * 1024
}

// Cinco minutos.
fn default_timeout_secs() -> u64 {
    300
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            queue_file: default_queue_file(),
            data_dir: default_data_dir(),
            state_file: None,
            generator: GeneratorConfig::default(),
        }
    }
}

impl CrawlerConfig {
    /// Carrega a configuração de `path`, ou de `gistcrawl.toml` no diretório atual.
    ///
    /// O arquivo padrão ausente significa defaults; um `path` explícito ausente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(dir) = std::env::var(DATA_DIR_ENV)
            && !dir.is_empty()
        {
            config.data_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejeita combinações que só falhariam no meio da execução.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if let GeneratorConfig::Command { program, .. } = &self.generator
            && program.trim().is_empty()
        {
            return Err(CrawlError::Config(
                "generator.program must not be empty".into(),
            ));
        }
        if let GeneratorConfig::Digest {
            max_file_bytes,
            max_total_bytes,
        } = &self.generator
            && (*max_file_bytes == 0 || *max_total_bytes == 0)
        {
            return Err(CrawlError::Config(
                "digest size limits must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str::<CrawlerConfig>(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Caminho efetivo do arquivo de estado.
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(STATE_FILE_NAME))
    }
}
