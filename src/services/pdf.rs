//! Invoice PDF rendering.
//!
//! Services build an [`InvoiceDocument`] snapshot from the database rows and
//! hand it to an [`InvoiceRenderer`]. [`PrintPdfRenderer`] lays it out on A4
//! pages with the builtin Helvetica fonts, so no font files are needed.

use chrono::NaiveDate;
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Point,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::BufWriter;
use thiserror::Error;

use crate::entities::{client, invoice, line_item, user, InvoiceStatus};
use crate::services::totals::money;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 15.0;
const MARGIN_RIGHT: f32 = 195.0;
const TOP: f32 = 282.0;
const BOTTOM: f32 = 25.0;

// Table columns (x positions)
const X_DESC: f32 = 15.0;
const X_QTY: f32 = 105.0;
const X_UNIT: f32 = 125.0;
const X_TAX: f32 = 152.0;
const X_TOTAL: f32 = 170.0;
const DESC_WRAP_CHARS: usize = 48;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pdf error: {0}")]
    Pdf(String),
    #[error("render task failed: {0}")]
    Task(String),
}

/// A party shown on the invoice: the issuing company or the billed client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Party {
    pub name: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BankDetails {
    pub bank_name: Option<String>,
    pub account: Option<String>,
    pub iban: Option<String>,
    pub swift: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentLine {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub total: Decimal,
}

/// Everything printed on an invoice, detached from the database rows.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDocument {
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub currency: String,
    pub issuer: Party,
    pub client: Party,
    pub lines: Vec<DocumentLine>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub balance_due: Decimal,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub bank: Option<BankDetails>,
}

fn push_some(lines: &mut Vec<String>, value: &Option<String>, label: Option<&str>) {
    if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        match label {
            Some(label) => lines.push(format!("{}: {}", label, v)),
            None => lines.extend(v.lines().map(str::to_string)),
        }
    }
}

impl InvoiceDocument {
    pub fn from_parts(
        issuer: &user::Model,
        client: &client::Model,
        invoice: &invoice::Model,
        items: &[line_item::Model],
    ) -> Self {
        let mut issuer_lines = Vec::new();
        push_some(&mut issuer_lines, &issuer.company_address, None);
        push_some(&mut issuer_lines, &issuer.company_tax_id, Some("Tax ID"));
        push_some(&mut issuer_lines, &issuer.company_email, None);
        push_some(&mut issuer_lines, &issuer.company_phone, None);

        let mut client_lines = Vec::new();
        push_some(&mut client_lines, &client.address, None);
        push_some(&mut client_lines, &client.tax_id, Some("Tax ID"));
        push_some(&mut client_lines, &client.email, None);
        push_some(&mut client_lines, &client.phone, None);

        let bank = if issuer.bank_name.is_some()
            || issuer.bank_account.is_some()
            || issuer.bank_iban.is_some()
            || issuer.bank_swift.is_some()
        {
            Some(BankDetails {
                bank_name: issuer.bank_name.clone(),
                account: issuer.bank_account.clone(),
                iban: issuer.bank_iban.clone(),
                swift: issuer.bank_swift.clone(),
            })
        } else {
            None
        };

        let mut items: Vec<&line_item::Model> = items.iter().collect();
        items.sort_by_key(|item| item.line_order);

        Self {
            invoice_number: invoice.invoice_number.clone(),
            status: invoice.status,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            currency: invoice.currency.clone(),
            issuer: Party {
                name: issuer
                    .company_name
                    .clone()
                    .unwrap_or_else(|| issuer.name.clone()),
                lines: issuer_lines,
            },
            client: Party {
                name: client.name.clone(),
                lines: client_lines,
            },
            lines: items
                .into_iter()
                .map(|item| DocumentLine {
                    description: item.description.clone(),
                    quantity: item.quantity,
                    unit_price: money(item.unit_price),
                    tax_rate: item.tax_rate,
                    total: money(item.total),
                })
                .collect(),
            subtotal: money(invoice.subtotal),
            tax_amount: money(invoice.tax_amount),
            total: money(invoice.total),
            paid_amount: money(invoice.paid_amount),
            balance_due: invoice.balance_due(),
            notes: invoice.notes.clone(),
            terms: invoice.terms.clone(),
            bank,
        }
    }
}

pub trait InvoiceRenderer: Send + Sync {
    fn render(&self, document: &InvoiceDocument) -> Result<Vec<u8>, RenderError>;
}

/// `invoice-<number>.pdf` with anything outside `[A-Za-z0-9._-]` replaced
pub fn pdf_filename(invoice_number: &str) -> String {
    let sanitized: String = invoice_number
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "invoice.pdf".to_string()
    } else {
        format!("invoice-{}.pdf", sanitized)
    }
}

/// `1234567.5` → `1,234,567.50`
pub fn format_money(value: Decimal) -> String {
    let s = money(value).abs().to_string();
    let (int_part, dec_part) = s.split_once('.').unwrap_or((s.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < Decimal::ZERO && !money(value).is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, dec_part)
}

fn format_quantity(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Greedy word wrap on character count; long words are split.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            while word.chars().count() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let head: String = word.chars().take(max_chars).collect();
                word = word.chars().skip(max_chars).collect();
                lines.push(head);
            }
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Cursor over the document that adds pages as the content grows.
struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl<'a> PageWriter<'a> {
    fn text(&self, text: &str, size: f32, x: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    fn rule(&self) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN_LEFT), Mm(self.y)), false),
                (Point::new(Mm(MARGIN_RIGHT), Mm(self.y)), false),
            ],
            is_closed: false,
        });
    }

    /// Moves the cursor down, starting a new page when it would pass the bottom margin
    fn advance(&mut self, dy: f32) {
        self.y -= dy;
        if self.y < BOTTOM {
            self.new_page();
        }
    }

    fn new_page(&mut self) {
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = TOP;
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrintPdfRenderer;

impl PrintPdfRenderer {
    pub fn new() -> Self {
        Self
    }

    fn draw_header(w: &mut PageWriter<'_>, document: &InvoiceDocument) {
        let top = w.y;

        // Issuer (left)
        w.text(&document.issuer.name, 16.0, MARGIN_LEFT, true);
        for line in &document.issuer.lines {
            w.advance(5.0);
            w.text(line, 9.0, MARGIN_LEFT, false);
        }
        let issuer_bottom = w.y;

        // Title (right)
        w.y = top;
        w.text("INVOICE", 22.0, 140.0, true);
        w.y -= 8.0;
        w.text(&document.invoice_number, 12.0, 140.0, true);
        w.y -= 6.0;
        w.text(&format!("Status: {}", document.status), 9.0, 140.0, false);

        w.y = issuer_bottom.min(w.y);
        w.advance(8.0);
        w.rule();
    }

    fn draw_parties(w: &mut PageWriter<'_>, document: &InvoiceDocument) {
        w.advance(8.0);
        w.text("Bill to:", 11.0, MARGIN_LEFT, true);
        w.text("Details:", 11.0, 120.0, true);

        let mut details = vec![format!("Issue date: {}", document.issue_date)];
        if let Some(due) = document.due_date {
            details.push(format!("Due date: {}", due));
        }
        details.push(format!("Currency: {}", document.currency));

        let mut left = vec![document.client.name.clone()];
        left.extend(document.client.lines.iter().cloned());

        let rows = left.len().max(details.len());
        for i in 0..rows {
            w.advance(5.0);
            if let Some(line) = left.get(i) {
                w.text(line, 10.0, MARGIN_LEFT, i == 0);
            }
            if let Some(line) = details.get(i) {
                w.text(line, 10.0, 120.0, false);
            }
        }
    }

    fn draw_table_header(w: &mut PageWriter<'_>) {
        w.text("Description", 10.0, X_DESC, true);
        w.text("Qty", 10.0, X_QTY, true);
        w.text("Price", 10.0, X_UNIT, true);
        w.text("Tax %", 10.0, X_TAX, true);
        w.text("Total", 10.0, X_TOTAL, true);
        w.y -= 3.0;
        w.rule();
    }

    fn draw_lines(w: &mut PageWriter<'_>, document: &InvoiceDocument) {
        w.advance(12.0);
        Self::draw_table_header(w);

        for (idx, line) in document.lines.iter().enumerate() {
            let wrapped = wrap_text(
                &format!("{}. {}", idx + 1, line.description),
                DESC_WRAP_CHARS,
            );

            let pages_before = w.pages;
            w.advance(6.0);
            if w.pages != pages_before {
                Self::draw_table_header(w);
                w.advance(6.0);
            }

            w.text(&wrapped[0], 10.0, X_DESC, false);
            w.text(&format_quantity(line.quantity), 10.0, X_QTY, false);
            w.text(&format_money(line.unit_price), 10.0, X_UNIT, false);
            w.text(&format_quantity(line.tax_rate), 10.0, X_TAX, false);
            w.text(&format_money(line.total), 10.0, X_TOTAL, true);

            for extra in wrapped.iter().skip(1) {
                w.advance(4.5);
                w.text(extra, 10.0, X_DESC + 4.0, false);
            }
        }

        w.advance(4.0);
        w.rule();
    }

    fn draw_totals(w: &mut PageWriter<'_>, document: &InvoiceDocument) {
        let rows = [
            ("Subtotal:", format_money(document.subtotal), false),
            ("Tax:", format_money(document.tax_amount), false),
            (
                "TOTAL:",
                format!("{} {}", format_money(document.total), document.currency),
                true,
            ),
        ];
        for (label, value, bold) in rows {
            w.advance(7.0);
            w.text(label, 11.0, 135.0, bold);
            w.text(&value, 11.0, X_TOTAL - 5.0, true);
        }

        if !document.paid_amount.is_zero() {
            w.advance(7.0);
            w.text("Paid:", 10.0, 135.0, false);
            w.text(&format_money(document.paid_amount), 10.0, X_TOTAL - 5.0, false);
            w.advance(6.0);
            w.text("Balance due:", 10.0, 135.0, true);
            w.text(
                &format!("{} {}", format_money(document.balance_due), document.currency),
                10.0,
                X_TOTAL - 5.0,
                true,
            );
        }
    }

    fn draw_footer_blocks(w: &mut PageWriter<'_>, document: &InvoiceDocument) {
        if let Some(bank) = &document.bank {
            w.advance(14.0);
            w.text("Payment details:", 11.0, MARGIN_LEFT, true);
            let fields = [
                ("Bank", &bank.bank_name),
                ("Account", &bank.account),
                ("IBAN", &bank.iban),
                ("SWIFT/BIC", &bank.swift),
            ];
            for (label, value) in fields {
                if let Some(value) = value {
                    w.advance(5.0);
                    w.text(&format!("{}: {}", label, value), 10.0, MARGIN_LEFT, false);
                }
            }
        }

        for (title, body) in [("Notes:", &document.notes), ("Terms:", &document.terms)] {
            let Some(body) = body.as_deref().filter(|b| !b.trim().is_empty()) else {
                continue;
            };
            w.advance(12.0);
            w.text(title, 11.0, MARGIN_LEFT, true);
            for line in wrap_text(body, 95) {
                w.advance(5.0);
                w.text(&line, 10.0, MARGIN_LEFT, false);
            }
        }
    }
}

impl InvoiceRenderer for PrintPdfRenderer {
    fn render(&self, document: &InvoiceDocument) -> Result<Vec<u8>, RenderError> {
        let title = format!("Invoice {}", document.invoice_number);
        let (doc, page1, layer1) =
            PdfDocument::new(&title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Page 1");

        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;

        {
            let mut writer = PageWriter {
                doc: &doc,
                layer: doc.get_page(page1).get_layer(layer1),
                regular,
                bold,
                y: TOP,
                pages: 1,
            };

            Self::draw_header(&mut writer, document);
            Self::draw_parties(&mut writer, document);
            Self::draw_lines(&mut writer, document);
            Self::draw_totals(&mut writer, document);
            Self::draw_footer_blocks(&mut writer, document);
        }

        let mut buffer = BufWriter::new(Vec::<u8>::new());
        doc.save(&mut buffer)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        buffer
            .into_inner()
            .map_err(|e| RenderError::Pdf(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(lines: usize) -> InvoiceDocument {
        InvoiceDocument {
            invoice_number: "INV-2024-000042".into(),
            status: InvoiceStatus::Draft,
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 31),
            currency: "EUR".into(),
            issuer: Party {
                name: "Acme Studio".into(),
                lines: vec!["1 Main Street".into(), "Tax ID: 123".into()],
            },
            client: Party {
                name: "Globex".into(),
                lines: vec!["billing@globex.test".into()],
            },
            lines: (0..lines)
                .map(|i| DocumentLine {
                    description: format!("Consulting block {} with a fairly long description that wraps", i),
                    quantity: dec!(1.5),
                    unit_price: dec!(1200.00),
                    tax_rate: dec!(20),
                    total: dec!(2160.00),
                })
                .collect(),
            subtotal: dec!(1800.00),
            tax_amount: dec!(360.00),
            total: dec!(2160.00),
            paid_amount: dec!(0.00),
            balance_due: dec!(2160.00),
            notes: Some("Thank you for your business.".into()),
            terms: Some("Net 30".into()),
            bank: Some(BankDetails {
                bank_name: Some("First Bank".into()),
                account: None,
                iban: Some("DE89370400440532013000".into()),
                swift: None,
            }),
        }
    }

    #[test]
    fn renders_a_pdf() {
        let bytes = PrintPdfRenderer::new().render(&sample(3)).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn long_invoices_spill_onto_more_pages() {
        let short = PrintPdfRenderer::new().render(&sample(2)).unwrap();
        let long = PrintPdfRenderer::new().render(&sample(120)).unwrap();
        assert!(long.starts_with(b"%PDF-"));
        assert!(long.len() > short.len());
    }

    #[test]
    fn money_is_grouped_by_thousands() {
        assert_eq!(format_money(dec!(0)), "0.00");
        assert_eq!(format_money(dec!(999.9)), "999.90");
        assert_eq!(format_money(dec!(1234567.5)), "1,234,567.50");
        assert_eq!(format_money(dec!(-1500)), "-1,500.00");
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(pdf_filename("INV-2024-000001"), "invoice-INV-2024-000001.pdf");
        assert_eq!(pdf_filename("A/B 7"), "invoice-A_B_7.pdf");
        assert_eq!(pdf_filename("   "), "invoice.pdf");
    }

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text("alpha beta gamma delta", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta"]);
        let split = wrap_text("abcdefghij", 4);
        assert_eq!(split, vec!["abcd", "efgh", "ij"]);
    }
}
