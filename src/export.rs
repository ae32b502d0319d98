//! Spreadsheet, delimited-text and JSON exports of result tables.
//!
//! Amounts are written unformatted with two decimal places (numeric cells in
//! the workbook) so spreadsheets read them as numbers; display formatting
//! lives in [`crate::format`].

use std::io::Write;

use anyhow::Context;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook};

use crate::bank::{BankPhase, BankRow};
use crate::engine::ResultRow;
use crate::scenario::ScenarioResult;

pub const RESULT_HEADERS: [&str; 9] = [
    "Mês/Data",
    "Fase",
    "Saldo Devedor",
    "Ajuste INCC (R$)",
    "Ajuste IPCA (R$)",
    "Correção INCC ou IPCA diluída (R$)",
    "Amortização Base",
    "Juros (R$)",
    "Parcela Total",
];

pub const BANK_HEADERS: [&str; 10] = [
    "Mês",
    "Fase",
    "Obra (%)",
    "Saldo Devedor",
    "Atualização (R$)",
    "Amortização",
    "Juros (R$)",
    "Seguros (R$)",
    "Taxa Adm. (R$)",
    "Parcela Total",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub delimiter: u8,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions { delimiter: b';' }
    }
}

fn amount(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

fn row_amounts(row: &ResultRow) -> [Decimal; 7] {
    [
        row.balance,
        row.incc_adjustment,
        row.ipca_adjustment,
        row.correction_paid,
        row.base_amortization,
        row.interest,
        row.total_payment,
    ]
}

fn month_cell(row: &ResultRow) -> String {
    format!("{} - {}", row.month, row.label)
}

fn result_record(row: &ResultRow) -> [String; 9] {
    [
        month_cell(row),
        row.phase.label().to_string(),
        amount(row.balance),
        amount(row.incc_adjustment),
        amount(row.ipca_adjustment),
        amount(row.correction_paid),
        amount(row.base_amortization),
        amount(row.interest),
        amount(row.total_payment),
    ]
}

fn writer<W: Write>(out: W, options: ExportOptions) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .from_writer(out)
}

/// Writes one scenario's builder table.
pub fn write_rows_csv<W: Write>(out: W, rows: &[ResultRow], options: ExportOptions) -> anyhow::Result<()> {
    let mut wtr = writer(out, options);
    wtr.write_record(RESULT_HEADERS)?;
    for row in rows {
        wtr.write_record(result_record(row))
            .with_context(|| format!("writing month {}", row.month))?;
    }
    wtr.flush().context("flushing result table")?;
    Ok(())
}

/// Writes every scenario's builder table in one file, with a leading
/// scenario column.
pub fn write_comparison_csv<W: Write>(
    out: W,
    results: &[ScenarioResult],
    options: ExportOptions,
) -> anyhow::Result<()> {
    let mut wtr = writer(out, options);
    wtr.write_record(std::iter::once("Cenário").chain(RESULT_HEADERS))?;
    for result in results {
        for row in &result.builder.rows {
            wtr.write_record(std::iter::once(result.label.clone()).chain(result_record(row)))
                .with_context(|| format!("writing scenario '{}' month {}", result.label, row.month))?;
        }
    }
    wtr.flush().context("flushing comparison table")?;
    Ok(())
}

/// Writes a workbook with one worksheet per scenario, named after the
/// scenario label, holding its builder table.
///
/// # Errors
///
/// Returns an error if the workbook cannot be assembled or written to `out`.
pub fn write_comparison_xlsx<W: Write>(mut out: W, results: &[ScenarioResult]) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format("#,##0.00");
    let mut names: Vec<String> = Vec::with_capacity(results.len());

    for result in results {
        let name = sheet_name(&result.label, &names);
        let sheet = workbook.add_worksheet();
        sheet
            .set_name(name.as_str())
            .with_context(|| format!("naming sheet '{name}'"))?;
        for (col, title) in RESULT_HEADERS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *title, &bold)?;
        }
        for (i, row) in result.builder.rows.iter().enumerate() {
            let line = i as u32 + 1;
            sheet.write_string(line, 0, month_cell(row))?;
            sheet.write_string(line, 1, row.phase.label())?;
            for (offset, value) in row_amounts(row).into_iter().enumerate() {
                let number = value.round_dp(2).to_f64().unwrap_or_default();
                sheet.write_number_with_format(line, offset as u16 + 2, number, &money)?;
            }
        }
        names.push(name);
    }

    let buffer = workbook.save_to_buffer().context("assembling workbook")?;
    out.write_all(&buffer).context("writing workbook")?;
    Ok(())
}

/// Worksheet name for `label`: at most 31 characters, none of `[]:*?/\`,
/// unique (case-insensitively) among `taken`.
fn sheet_name(label: &str, taken: &[String]) -> String {
    const MAX_LEN: usize = 31;
    let cleaned: String = label
        .chars()
        .map(|c| if "[]:*?/\\".contains(c) { '-' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'');
    let base: String = if cleaned.is_empty() { "Cenário" } else { cleaned }
        .chars()
        .take(MAX_LEN)
        .collect();

    let mut name = base.clone();
    let mut copy = 2;
    while taken.iter().any(|other| other.to_lowercase() == name.to_lowercase()) {
        let suffix = format!(" ({copy})");
        let head: String = base.chars().take(MAX_LEN - suffix.len()).collect();
        name = format!("{head}{suffix}");
        copy += 1;
    }
    name
}

/// Writes a bank loan table.
pub fn write_bank_rows_csv<W: Write>(out: W, rows: &[BankRow], options: ExportOptions) -> anyhow::Result<()> {
    let mut wtr = writer(out, options);
    wtr.write_record(BANK_HEADERS)?;
    for row in rows {
        let phase = match row.phase {
            BankPhase::Construction => "Obra",
            BankPhase::Amortization => "Amortização",
        };
        wtr.write_record([
            row.month.to_string(),
            phase.to_string(),
            amount(row.percent_complete * Decimal::ONE_HUNDRED),
            amount(row.balance),
            amount(row.index_adjustment),
            amount(row.amortization),
            amount(row.interest),
            amount(row.insurance),
            amount(row.admin_fee),
            amount(row.total_payment),
        ])
        .with_context(|| format!("writing bank month {}", row.month))?;
    }
    wtr.flush().context("flushing bank table")?;
    Ok(())
}

/// The full comparison as pretty-printed JSON.
pub fn to_json(results: &[ScenarioResult]) -> anyhow::Result<String> {
    serde_json::to_string_pretty(results).context("serializing scenario comparison")
}
