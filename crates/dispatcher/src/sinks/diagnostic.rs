//! DiagnosticSink - one human-readable line per trigger

use std::io::{Stdout, Write};
use std::time::Instant;

use contracts::{ContractError, TriggerEvent, TriggerSink};

/// Significant digits of the elapsed-seconds field
const ELAPSED_PRECISION: usize = 5;

/// Writes `Trigger <elapsed>: <char> <code>` lines
///
/// Elapsed seconds are measured from the sink's construction and printed with
/// five significant digits, trailing zeros dropped.
pub struct DiagnosticSink<W: Write + Send = Stdout> {
    name: String,
    writer: W,
    start: Instant,
}

impl DiagnosticSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> DiagnosticSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            name: "diagnostic".to_string(),
            writer,
            start: Instant::now(),
        }
    }

    /// Format the line for `event`
    pub fn format_line(&self, event: &TriggerEvent) -> String {
        let elapsed = event.timestamp.saturating_duration_since(self.start);
        format!(
            "Trigger {}: {} {}",
            format_significant(elapsed.as_secs_f64(), ELAPSED_PRECISION),
            event.code_char(),
            event.code
        )
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// `%g`-style formatting: `precision` significant digits, fixed notation
/// unless the exponent is below -4 or at least `precision`
fn format_significant(value: f64, precision: usize) -> String {
    let precision = precision.max(1);
    if !value.is_finite() {
        return value.to_string();
    }

    // Rounding first settles the exponent (9.99996 -> 1.0000e1)
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

impl<W: Write + Send + 'static> TriggerSink for DiagnosticSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn trigger(&mut self, event: TriggerEvent) -> Result<(), ContractError> {
        let line = self.format_line(&event);
        writeln!(self.writer, "{}", line)
            .and_then(|_| self.writer.flush())
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.writer.flush()?;
        Ok(())
    }
}
