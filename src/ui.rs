//! Interface de terminal do gistcrawl: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`RunProgress`] acompanha visualmente cada job
//! da fila; [`print_summary`] e [`print_status`] formatam os resultados.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::engine::{Disposition, JobReport};
use crate::queue::RejectedLine;
use crate::runner::{RunObserver, RunSummary};
use crate::state_machine::Job;
use crate::store::{LoadStatus, StateStore};

/// Indicador visual de progresso para a execução da fila no terminal.
///
/// Exibe um spinner animado durante cada job e uma linha colorida ao final:
/// sucesso (verde), pulado (ciano), falha (vermelho).
pub struct RunProgress {
    // Spinner do job atual, se houver.
    pb: Option<ProgressBar>,
    // Com saída detalhada o spinner fica oculto para não disputar o stderr com os logs.
    hidden: bool,
    green: Style,
    red: Style,
    cyan: Style,
}

impl RunProgress {
    pub fn new(hidden: bool) -> Self {
        Self {
            pb: None,
            hidden,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            cyan: Style::new().cyan(),
        }
    }

    fn spinner(&self, message: String) -> ProgressBar {
        if self.hidden {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

impl RunObserver for RunProgress {
    fn job_started(&mut self, index: usize, total: usize, job: &Job) {
        self.pb = Some(self.spinner(format!("[{}/{total}] {}", index + 1, job.url)));
    }

    /// Finaliza o spinner e exibe o resultado do job.
    fn job_finished(&mut self, report: &JobReport) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
        let line = if report.disposition.is_failure() {
            let stage = match report.disposition {
                Disposition::FetchFailed => "fetch failed",
                _ => "generation failed",
            };
            format!(
                "  {} {} {stage}: {}",
                self.red.apply_to("✗"),
                report.url,
                report.error.as_deref().unwrap_or("unknown error")
            )
        } else if report.disposition == Disposition::Regenerated {
            let why = report.reason.map(|r| format!(" ({r})")).unwrap_or_default();
            format!("  {} {} regenerated{why}", self.green.apply_to("✓"), report.url)
        } else {
            format!("  {} {} up to date", self.cyan.apply_to("="), report.url)
        };
        println!("{line}");
        if !report.persisted {
            println!(
                "    {}",
                self.red.apply_to("state not saved, will retry at end of run")
            );
        }
    }
}

/// Imprime avisos sobre linhas da fila que foram ignoradas.
pub fn print_rejected(rejected: &[RejectedLine]) {
    let yellow = Style::new().yellow();
    for line in rejected {
        println!(
            "  {} line {}: `{}` ({})",
            yellow.apply_to("!"),
            line.line,
            line.content,
            line.reason
        );
    }
}

/// Informa como o arquivo de estado foi carregado; só o caso corrompido vai para o terminal.
pub fn print_load_status(status: &LoadStatus) {
    match status {
        LoadStatus::Fresh => info!("no crawl state yet, starting fresh"),
        LoadStatus::Loaded(count) => info!(records = count, "loaded crawl state"),
        LoadStatus::Recovered(reason) => {
            let yellow = Style::new().yellow().bold();
            println!(
                "{} state file was unreadable ({reason}); starting from empty state",
                yellow.apply_to("⚠")
            );
        }
    }
}

/// Imprime o resumo da execução.
pub fn print_summary(summary: &RunSummary) {
    let bold = Style::new().bold();
    let green = Style::new().green();
    let red = Style::new().red();
    let yellow = Style::new().yellow();

    println!();
    println!("{}", bold.apply_to("─── Crawl Summary ───"));
    println!("  Run:          {}", summary.run_id);
    println!("  Total:        {}", summary.total);
    println!("  Processed:    {}", summary.processed());
    println!("  Fetched:      {}", summary.fetched);
    println!("  Skipped:      {}", summary.skipped);
    println!("  Regenerated:  {}", green.apply_to(summary.regenerated));
    let failed = summary.failed();
    let failed_text = format!(
        "{failed} (fetch {}, generation {})",
        summary.fetch_failed, summary.generation_failed
    );
    if failed > 0 {
        println!("  Failed:       {}", red.apply_to(failed_text));
    } else {
        println!("  Failed:       {failed_text}");
    }
    if summary.persist_failures > 0 {
        println!(
            "  {}",
            yellow.apply_to(format!(
                "State could not be saved after {} job(s)",
                summary.persist_failures
            ))
        );
    }
    if !summary.final_persist_ok {
        println!("  {}", red.apply_to("State file was NOT updated"));
    }
    if summary.interrupted {
        println!(
            "  {}",
            yellow.apply_to("Interrupted: remaining jobs run next time")
        );
    }
}

/// Imprime a tabela de registros do arquivo de estado.
pub fn print_status(store: &StateStore) {
    let bold = Style::new().bold();
    let green = Style::new().green();
    let red = Style::new().red();
    let dim = Style::new().dim();

    println!("{}", bold.apply_to(format!("State: {}", store.path().display())));
    if store.is_empty() {
        println!("  {}", dim.apply_to("no repositories recorded yet"));
        return;
    }

    let mut complete = 0;
    for (url, record) in store.records() {
        let flag = |ok: bool| if ok { "ok" } else { "FAILED" };
        let fingerprint = record
            .last_fingerprint
            .as_deref()
            .map(|f| &f[..f.len().min(12)])
            .unwrap_or("-");
        let marker = if record.is_complete() {
            complete += 1;
            green.apply_to("●")
        } else {
            red.apply_to("●")
        };
        println!(
            "  {marker} {url}\n      fetch {:<6} artifact {:<6} rev {fingerprint:<12} {}",
            flag(record.fetch_succeeded),
            flag(record.artifact_succeeded),
            dim.apply_to(record.last_attempt_time.format("%Y-%m-%d %H:%M:%S UTC")),
        );
        if let Some(err) = &record.last_error {
            println!("      {}", red.apply_to(err));
        }
    }
    println!();
    println!(
        "  {complete} complete, {} incomplete",
        store.len() - complete
    );
}
