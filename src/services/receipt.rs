//! Fiscal receipt files for the printer bridge.
//!
//! One `S` line per sold item and a closing `P` payment line, each ended by
//! CRLF. The bridge watches the receipt directory and prints whatever lands
//! there.

use std::path::Path;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    config::ReceiptSettings,
    models::{PaymentMethod, TicketLine},
    utils::text::fiscal_text,
};

pub const DEFAULT_UNIT: &str = "buc";
// Used when a name is nothing but emoji or separators
const FALLBACK_NAME: &str = "Produs";

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptLine {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: Decimal,
    pub unit: String,
}

impl From<&TicketLine> for ReceiptLine {
    fn from(line: &TicketLine) -> Self {
        Self {
            name: line.product_name.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            unit: DEFAULT_UNIT.to_string(),
        }
    }
}

pub fn total(lines: &[ReceiptLine]) -> Decimal {
    lines
        .iter()
        .map(|l| (l.unit_price * l.quantity).round_dp(2))
        .sum()
}

fn sale_line(line: &ReceiptLine, settings: &ReceiptSettings) -> String {
    let mut name = fiscal_text(&line.name, settings.separator, settings.name_limit);
    if name.is_empty() {
        name = FALLBACK_NAME.chars().take(settings.name_limit).collect();
    }
    let unit = fiscal_text(&line.unit, settings.separator, settings.name_limit);

    let fields = [
        "S".to_string(),
        name,
        format!("{:.2}", line.unit_price.round_dp(2)),
        format!("{:.3}", line.quantity.round_dp(3)),
        if unit.is_empty() { DEFAULT_UNIT.to_string() } else { unit },
        settings.vat_code.clone(),
        settings.department.clone(),
    ];
    fields.join(&settings.separator.to_string())
}

pub fn render(lines: &[ReceiptLine], payment: PaymentMethod, settings: &ReceiptSettings) -> String {
    let sep = settings.separator;
    let mut out = String::new();

    for line in lines {
        out.push_str(&sale_line(line, settings));
        out.push_str("\r\n");
    }

    out.push_str(&format!(
        "P{sep}{}{sep}{:.2}\r\n",
        payment.fiscal_code(),
        total(lines)
    ));
    out
}

pub fn file_name(order_id: Uuid, millis: i64) -> String {
    format!("bon_{}_{}.inp", order_id, millis)
}

/// Writes the receipt into `dir`, creating it when missing, and returns
/// the file name.
pub async fn write_receipt(dir: &Path, order_id: Uuid, contents: &str) -> std::io::Result<String> {
    tokio::fs::create_dir_all(dir).await?;

    let name = file_name(order_id, Utc::now().timestamp_millis());
    tokio::fs::write(dir.join(&name), contents.as_bytes()).await?;

    log::info!("Receipt {} written for order {}", name, order_id);
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn line(name: &str, price: &str, qty: &str) -> ReceiptLine {
        ReceiptLine {
            name: name.to_string(),
            unit_price: dec(price),
            quantity: dec(qty),
            unit: DEFAULT_UNIT.to_string(),
        }
    }

    #[test]
    fn renders_sale_and_payment_lines() {
        let lines = vec![line("Ciorbă de burtă", "24.5", "2"), line("Apă plată", "8", "1")];
        let out = render(&lines, PaymentMethod::Card, &ReceiptSettings::default());

        assert_eq!(
            out,
            "S;Ciorba de burta;24.50;2.000;buc;1;1\r\n\
             S;Apa plata;8.00;1.000;buc;1;1\r\n\
             P;1;57.00\r\n"
        );
    }

    #[test]
    fn cash_uses_payment_code_zero() {
        let out = render(&[line("Cafea", "9.9", "1")], PaymentMethod::Cash, &ReceiptSettings::default());
        assert!(out.ends_with("P;0;9.90\r\n"));
    }

    #[test]
    fn names_are_cleaned_and_truncated() {
        let settings = ReceiptSettings::default();
        let long = "🍕 Pizza Quattro Stagioni; extra mozzarella și ciuperci";
        let out = render(&[line(long, "42", "1")], PaymentMethod::Cash, &settings);

        let name = out.lines().next().unwrap().split(';').nth(1).unwrap();
        assert!(name.chars().count() <= settings.name_limit);
        assert!(name.is_ascii());
        assert!(name.starts_with("Pizza Quattro Stagioni extra"));
    }

    #[test]
    fn custom_separator_is_respected_and_scrubbed() {
        let settings = ReceiptSettings {
            separator: '^',
            ..ReceiptSettings::default()
        };
        let out = render(&[line("Sos^special", "3", "0.5")], PaymentMethod::Cash, &settings);

        assert_eq!(out, "S^Sos special^3.00^0.500^buc^1^1\r\nP^0^1.50\r\n");
    }

    #[test]
    fn emoji_only_names_fall_back() {
        let out = render(&[line("🍺🍺", "10", "1")], PaymentMethod::Cash, &ReceiptSettings::default());
        assert!(out.starts_with("S;Produs;"));
    }

    #[test]
    fn fallback_name_respects_a_short_budget() {
        let settings = ReceiptSettings {
            name_limit: 3,
            ..ReceiptSettings::default()
        };
        let out = render(&[line("🍺🍺", "10", "1"), line(";;", "5", "1")], PaymentMethod::Cash, &settings);

        for sale in out.lines().filter(|l| l.starts_with('S')) {
            let name = sale.split(';').nth(1).unwrap();
            assert_eq!(name, "Pro");
            assert!(name.chars().count() <= settings.name_limit);
        }
    }

    #[test]
    fn every_line_has_seven_fields() {
        let lines = vec![line("Limonadă", "12", "3"), line("Tort", "15.75", "0.25")];
        let out = render(&lines, PaymentMethod::Card, &ReceiptSettings::default());

        for sale in out.lines().filter(|l| l.starts_with('S')) {
            assert_eq!(sale.split(';').count(), 7);
        }
    }

    #[test]
    fn file_name_embeds_order_and_time() {
        let id = Uuid::nil();
        assert_eq!(
            file_name(id, 1_700_000_000_000),
            "bon_00000000-0000-0000-0000-000000000000_1700000000000.inp"
        );
    }

    #[tokio::test]
    async fn writes_file_into_a_new_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("fiscal");
        let id = Uuid::new_v4();

        let name = write_receipt(&dir, id, "P;0;0.00\r\n").await.unwrap();

        assert!(name.starts_with(&format!("bon_{id}_")));
        assert!(name.ends_with(".inp"));
        let written = std::fs::read_to_string(dir.join(&name)).unwrap();
        assert_eq!(written, "P;0;0.00\r\n");
    }
}
