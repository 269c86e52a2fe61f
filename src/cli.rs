//! Interface de linha de comando do gistcrawl baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, status, forget)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// gistcrawl: mantém digests de texto atualizados para uma fila de repositórios git.
#[derive(Debug, Parser)]
#[command(name = "gistcrawl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração TOML.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Processa a fila: sincroniza cada repositório e regenera o que mudou.
    Run {
        /// Arquivo da fila, uma URL por linha.
        #[arg(long)]
        queue: Option<PathBuf>,

        /// Diretório onde ficam checkouts, artefatos e o arquivo de estado.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Mostra o estado registrado de cada repositório.
    Status {
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Remove registros do estado para forçar regeneração na próxima execução.
    Forget {
        /// URLs a esquecer.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        urls: Vec<String>,

        /// Esquece todos os registros.
        #[arg(long)]
        all: bool,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}
