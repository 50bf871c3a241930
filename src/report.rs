//! Presentation of per-step results.

use std::io::{self, Write};

use crate::simulation::{RunSummary, StepRecord};

/// Consumes the records of a run as they are produced.
pub trait Reporter {
    fn record(&mut self, record: &StepRecord) -> io::Result<()>;

    fn finish(&mut self, _summary: &RunSummary) -> io::Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn record(&mut self, _record: &StepRecord) -> io::Result<()> {
        Ok(())
    }
}

/// `Step  3: σ=0.299, Mode=Caution, Speed=0.5`
pub fn format_step(record: &StepRecord) -> String {
    let mut line = format!("Step {:2}: σ={:.3}", record.step, record.uncertainty);
    if let Some(decision) = record.decision {
        line.push_str(&format!(", Mode={}, Speed={:.1}", decision.mode, decision.speed));
    }
    line
}

/// Human readable lines, one per step, followed by a short summary.
#[derive(Debug)]
pub struct TextReporter<W: Write> {
    out: W,
}

impl<W: Write> TextReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn record(&mut self, record: &StepRecord) -> io::Result<()> {
        writeln!(self.out, "{}", format_step(record))
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        let params = summary
            .final_mean
            .iter()
            .map(|v| format!("{v:.4}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(self.out)?;
        writeln!(self.out, "Final parameters: [{params}]")?;
        writeln!(
            self.out,
            "Uncertainty: {:.3} -> {:.3} over {} steps",
            summary.initial_uncertainty, summary.final_uncertainty, summary.steps
        )?;
        if summary.normal_steps + summary.caution_steps + summary.stop_steps > 0 {
            writeln!(
                self.out,
                "Modes: Normal={}, Caution={}, Stop={}",
                summary.normal_steps, summary.caution_steps, summary.stop_steps
            )?;
        }
        self.out.flush()
    }
}

/// One JSON object per line: every step record, then the summary.
#[derive(Debug)]
pub struct JsonReporter<W: Write> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn record(&mut self, record: &StepRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        writeln!(self.out)
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &serde_json::json!({ "summary": summary }))?;
        writeln!(self.out)?;
        self.out.flush()
    }
}
