//! Spreadsheet rows → order candidates.
//!
//! Columns are recognised by header label through one declarative synonym
//! table. Labels are compared after trimming, lowercasing, folding French
//! accents and collapsing inner whitespace, so `"  N°  Commande"` and
//! `"n° commande"` are the same column.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use livraison_core::{LineItem, OrderNumber};

use crate::models::OrderDetails;

/// Order attributes a column can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderField {
    OrderNumber,
    Date,
    ClientName,
    Phone,
    Address,
    Product,
    Quantity,
    Price,
    Shop,
    Status,
    /// Only used when writing assignments back.
    Courier,
}

/// Accepted header labels per field, already normalised.
pub const SYNONYMS: &[(OrderField, &[&str])] = &[
    (
        OrderField::OrderNumber,
        &[
            "n° commande",
            "n°commande",
            "no commande",
            "num commande",
            "numero commande",
            "numero de commande",
            "numerocommande",
            "id commande",
            "commande",
            "reference",
            "ref",
            "order number",
            "order id",
            "order",
        ],
    ),
    (
        OrderField::Date,
        &[
            "date",
            "date commande",
            "date de commande",
            "datecommande",
            "order date",
            "created at",
        ],
    ),
    (
        OrderField::ClientName,
        &[
            "client",
            "nom client",
            "nom du client",
            "client nom",
            "clientnom",
            "nom",
            "nom complet",
            "customer",
            "customer name",
            "name",
        ],
    ),
    (
        OrderField::Phone,
        &[
            "telephone",
            "tel",
            "tel.",
            "telephone client",
            "numero telephone",
            "numero de telephone",
            "portable",
            "gsm",
            "phone",
            "mobile",
        ],
    ),
    (
        OrderField::Address,
        &[
            "adresse",
            "adresse de livraison",
            "adresse livraison",
            "ville",
            "address",
            "delivery address",
        ],
    ),
    (
        OrderField::Product,
        &[
            "produit",
            "produits",
            "article",
            "articles",
            "nom produit",
            "product",
            "item",
        ],
    ),
    (
        OrderField::Quantity,
        &["quantite", "qte", "qté", "qty", "quantity", "nombre"],
    ),
    (
        OrderField::Price,
        &[
            "prix",
            "prix unitaire",
            "montant",
            "total",
            "price",
            "unit price",
            "amount",
        ],
    ),
    (
        OrderField::Shop,
        &["boutique", "magasin", "store", "shop", "site"],
    ),
    (
        OrderField::Status,
        &["statut", "status", "etat", "statut commande"],
    ),
    (
        OrderField::Courier,
        &["livreur", "livreur assigne", "coursier", "courier", "driver"],
    ),
];

/// Client name used when a row only carries an order number.
pub const UNKNOWN_CLIENT: &str = "Client inconnu";

/// Product name used when a row has no product column or value.
pub const UNKNOWN_PRODUCT: &str = "Produit non spécifié";

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'î' | 'ï' => 'i',
        'ô' | 'ö' => 'o',
        'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        other => other,
    }
}

/// Normalise a header label for comparison.
#[must_use]
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .map(fold_accent)
        .collect()
}

/// The field a header label maps to, if any.
#[must_use]
pub fn field_for_label(label: &str) -> Option<OrderField> {
    let normalized = normalize_label(label);
    if normalized.is_empty() {
        return None;
    }
    SYNONYMS
        .iter()
        .find(|(_, labels)| labels.iter().any(|l| normalize_label(l) == normalized))
        .map(|(field, _)| *field)
}

/// Column index per recognised field. The leftmost matching column wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    columns: HashMap<OrderField, usize>,
}

impl ColumnMap {
    #[must_use]
    pub fn from_header<S: AsRef<str>>(header: &[S]) -> Self {
        let mut columns = HashMap::new();
        for (index, label) in header.iter().enumerate() {
            if let Some(field) = field_for_label(label.as_ref()) {
                columns.entry(field).or_insert(index);
            }
        }
        Self { columns }
    }

    #[must_use]
    pub fn column(&self, field: OrderField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// Trimmed, non-empty cell value for `field` in `row`.
    #[must_use]
    pub fn value<'r>(&self, row: &'r [String], field: OrderField) -> Option<&'r str> {
        self.column(field)
            .and_then(|i| row.get(i))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// Where the rows come from.
#[derive(Debug, Clone, Copy)]
pub struct SheetContext<'a> {
    pub spreadsheet_id: &'a str,
    pub sheet_name: &'a str,
    /// Shop label for rows without one.
    pub default_shop: &'a str,
}

impl SheetContext<'_> {
    /// Stable reference to one row: `{spreadsheetId}:{sheetName}:{rowNumber}`.
    #[must_use]
    pub fn row_reference(&self, row_number: u32) -> String {
        format!("{}:{}:{row_number}", self.spreadsheet_id, self.sheet_name)
    }
}

/// An order built from one spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCandidate {
    /// 1-based sheet row the candidate came from.
    pub row_number: u32,
    pub details: OrderDetails,
    /// False when the date cell was empty and `details` carries the
    /// mapping time instead.
    pub date_from_sheet: bool,
}

/// A row that looked like an order but could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row_number: u32,
    pub message: String,
}

/// Result of mapping a whole tab.
#[derive(Debug, Clone, Default)]
pub struct MappingOutcome {
    pub candidates: Vec<OrderCandidate>,
    pub rejected: Vec<RowError>,
    /// Rows with neither order number nor client name.
    pub skipped: usize,
}

/// Parse a sheet date. Slash, dash and dot dates are read day-first.
#[must_use]
pub fn parse_sheet_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%d-%m-%Y %H:%M:%S",
        "%d-%m-%Y %H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Parse a quantity cell. Empty means one.
///
/// # Errors
///
/// Returns a message for non-numeric, fractional or zero quantities.
pub fn parse_quantity(raw: Option<&str>) -> Result<u32, String> {
    let Some(raw) = raw else {
        return Ok(1);
    };
    let value = Decimal::from_str(&raw.replace(',', "."))
        .map_err(|_| format!("quantity '{raw}' is not a number"))?;
    if !value.fract().is_zero() {
        return Err(format!("quantity '{raw}' is not a whole number"));
    }
    let quantity: u32 = value
        .trunc()
        .to_string()
        .parse()
        .map_err(|_| format!("quantity '{raw}' is out of range"))?;
    if quantity == 0 {
        return Err(format!("quantity '{raw}' must be at least 1"));
    }
    Ok(quantity)
}

/// Parse a price cell. Currency symbols and spaces are ignored and a comma
/// may serve as decimal separator. Empty means zero.
///
/// # Errors
///
/// Returns a message for unreadable or negative prices.
pub fn parse_price(raw: Option<&str>) -> Result<Decimal, String> {
    let Some(raw) = raw else {
        return Ok(Decimal::ZERO);
    };
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    let normalized = match (kept.rfind(','), kept.rfind('.')) {
        // 1.234,50
        (Some(comma), Some(dot)) if comma > dot => kept.replace('.', "").replace(',', "."),
        // 1,234.50
        (Some(_), Some(_)) => kept.replace(',', ""),
        (Some(_), None) => kept.replace(',', "."),
        _ => kept,
    };
    if normalized.is_empty() {
        return Err(format!("price '{raw}' is not a number"));
    }
    let price =
        Decimal::from_str(&normalized).map_err(|_| format!("price '{raw}' is not a number"))?;
    if price.is_sign_negative() && !price.is_zero() {
        return Err(format!("price '{raw}' cannot be negative"));
    }
    Ok(price.normalize())
}

fn map_row(
    columns: &ColumnMap,
    row: &[String],
    row_number: u32,
    context: &SheetContext<'_>,
    now: DateTime<Utc>,
) -> Result<Option<OrderCandidate>, String> {
    let number = columns.value(row, OrderField::OrderNumber);
    let client = columns.value(row, OrderField::ClientName);
    if number.is_none() && client.is_none() {
        return Ok(None);
    }

    let numero_commande = match number {
        Some(n) => OrderNumber::parse(n),
        None => OrderNumber::parse(&format!("{}-{row_number}", context.sheet_name)),
    }
    .map_err(|e| e.to_string())?;

    let parsed_date = match columns.value(row, OrderField::Date) {
        Some(raw) => {
            Some(parse_sheet_date(raw).ok_or_else(|| format!("date '{raw}' is not a date"))?)
        }
        None => None,
    };

    let quantity = parse_quantity(columns.value(row, OrderField::Quantity))?;
    let price = parse_price(columns.value(row, OrderField::Price))?;
    let product = columns
        .value(row, OrderField::Product)
        .unwrap_or(UNKNOWN_PRODUCT);
    let item = LineItem::new(product, quantity, price).map_err(|e| e.to_string())?;

    let text = |field| columns.value(row, field).unwrap_or_default().to_string();

    Ok(Some(OrderCandidate {
        row_number,
        date_from_sheet: parsed_date.is_some(),
        details: OrderDetails {
            numero_commande,
            google_sheets_id: Some(context.row_reference(row_number)),
            date_commande: parsed_date.unwrap_or(now),
            client_nom: client.unwrap_or(UNKNOWN_CLIENT).to_string(),
            client_telephone: text(OrderField::Phone),
            adresse: text(OrderField::Address),
            articles: vec![item],
            boutique: columns
                .value(row, OrderField::Shop)
                .unwrap_or(context.default_shop)
                .to_string(),
            sheet_status: columns.value(row, OrderField::Status).map(str::to_string),
        },
    }))
}

/// Map data rows (header excluded) to order candidates.
///
/// The first data row is sheet row 2. Rows with neither an order number nor
/// a client name are skipped; rows with unreadable dates, quantities or
/// prices are rejected with a message.
#[must_use]
pub fn map_rows_to_orders(
    header: &[String],
    rows: &[Vec<String>],
    context: &SheetContext<'_>,
) -> MappingOutcome {
    let columns = ColumnMap::from_header(header);
    let now = Utc::now();
    let mut outcome = MappingOutcome::default();

    for (index, row) in rows.iter().enumerate() {
        let row_number = u32::try_from(index + 2).unwrap_or(u32::MAX);
        match map_row(&columns, row, row_number, context, now) {
            Ok(Some(candidate)) => outcome.candidates.push(candidate),
            Ok(None) => outcome.skipped += 1,
            Err(message) => {
                tracing::warn!(row = row_number, %message, "Rejected spreadsheet row");
                outcome.rejected.push(RowError {
                    row_number,
                    message,
                });
            }
        }
    }

    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| (*s).to_string()).collect()
    }

    const CONTEXT: SheetContext<'static> = SheetContext {
        spreadsheet_id: "sheet-abc",
        sheet_name: "Sheet1",
        default_shop: "Boutique principale",
    };

    #[test]
    fn test_labels_match_case_and_whitespace_insensitively() {
        assert_eq!(field_for_label("  N°   Commande "), Some(OrderField::OrderNumber));
        assert_eq!(field_for_label("TÉLÉPHONE"), Some(OrderField::Phone));
        assert_eq!(field_for_label("Qte"), Some(OrderField::Quantity));
        assert_eq!(field_for_label("Qté"), Some(OrderField::Quantity));
        assert_eq!(field_for_label("Statut"), Some(OrderField::Status));
        assert_eq!(field_for_label("Livreur"), Some(OrderField::Courier));
        assert_eq!(field_for_label("Remarques"), None);
        assert_eq!(field_for_label(""), None);
    }

    #[test]
    fn test_every_synonym_is_unique() {
        let mut seen = HashMap::new();
        for (field, labels) in SYNONYMS {
            for label in *labels {
                if let Some(previous) = seen.insert(normalize_label(label), *field) {
                    assert_eq!(previous, *field, "label {label} maps to two fields");
                }
            }
        }
    }

    #[test]
    fn test_first_matching_column_wins() {
        let map = ColumnMap::from_header(&strings(&["Client", "Nom", "Téléphone"]));
        assert_eq!(map.column(OrderField::ClientName), Some(0));
        assert_eq!(map.column(OrderField::Phone), Some(2));
        assert_eq!(map.column(OrderField::Price), None);
    }

    #[test]
    fn test_maps_reference_row() {
        let header = strings(&[
            "N° Commande",
            "Date",
            "Client",
            "Téléphone",
            "Adresse",
            "Produit",
            "Qte",
            "Prix",
            "Boutique",
            "Statut",
        ]);
        let row = strings(&[
            "CMD-1",
            "2024-01-01",
            "Jean Dupont",
            "0600000000",
            "1 Rue A",
            "Widget",
            "2",
            "9.99",
            "Shop1",
            "En attente",
        ]);

        let outcome = map_rows_to_orders(&header, &[row], &CONTEXT);
        assert_eq!(outcome.candidates.len(), 1);
        let candidate = &outcome.candidates[0];
        let order = &candidate.details;
        assert_eq!(order.numero_commande.as_str(), "CMD-1");
        assert_eq!(order.client_nom, "Jean Dupont");
        assert_eq!(order.client_telephone, "0600000000");
        assert_eq!(order.adresse, "1 Rue A");
        assert_eq!(order.boutique, "Shop1");
        assert_eq!(order.sheet_status.as_deref(), Some("En attente"));
        assert_eq!(order.google_sheets_id.as_deref(), Some("sheet-abc:Sheet1:2"));
        assert_eq!(
            order.articles,
            vec![LineItem::new("Widget", 2, Decimal::from_str("9.99").unwrap()).unwrap()]
        );
        assert!(candidate.date_from_sheet);
        assert_eq!(order.date_commande.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_rows_without_number_or_client_are_skipped() {
        let header = strings(&["Commande", "Client", "Adresse"]);
        let rows = vec![
            strings(&["", "", "1 Rue A"]),
            strings(&[]),
            strings(&["CMD-2", "", ""]),
            strings(&["", "Amina", ""]),
        ];
        let outcome = map_rows_to_orders(&header, &rows, &CONTEXT);

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.candidates[0].details.client_nom, UNKNOWN_CLIENT);
        assert_eq!(outcome.candidates[0].row_number, 4);
        // Missing order number falls back to a row-derived one
        assert_eq!(
            outcome.candidates[1].details.numero_commande.as_str(),
            "Sheet1-5"
        );
        assert_eq!(
            outcome.candidates[1].details.boutique,
            "Boutique principale"
        );
    }

    #[test]
    fn test_bad_quantity_rejects_row_only() {
        let header = strings(&["Commande", "Client", "Qte"]);
        let rows = vec![
            strings(&["CMD-1", "A", "deux"]),
            strings(&["CMD-2", "B", "0"]),
            strings(&["CMD-3", "C", ""]),
        ];
        let outcome = map_rows_to_orders(&header, &rows, &CONTEXT);

        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.rejected[0].row_number, 2);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].details.articles[0].quantity, 1);
        assert_eq!(outcome.candidates[0].details.articles[0].name, UNKNOWN_PRODUCT);
    }

    #[test]
    fn test_unreadable_date_rejects_row() {
        let header = strings(&["Commande", "Date", "Client"]);
        let rows = vec![
            strings(&["CMD-1", "not-a-date", "A"]),
            strings(&["CMD-2", "", "B"]),
        ];
        let outcome = map_rows_to_orders(&header, &rows, &CONTEXT);

        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].row_number, 2);
        assert!(outcome.rejected[0].message.contains("not-a-date"));
        assert_eq!(outcome.candidates.len(), 1);
        // An empty cell is not an error
        assert!(!outcome.candidates[0].date_from_sheet);
    }

    #[test]
    fn test_parse_price_variants() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert_eq!(parse_price(Some("9.99")).unwrap(), d("9.99"));
        assert_eq!(parse_price(Some("9,99 €")).unwrap(), d("9.99"));
        assert_eq!(parse_price(Some("1 234,50 MAD")).unwrap(), d("1234.5"));
        assert_eq!(parse_price(Some("1.234,50")).unwrap(), d("1234.5"));
        assert_eq!(parse_price(Some("1,234.50")).unwrap(), d("1234.5"));
        assert_eq!(parse_price(Some("150")).unwrap(), d("150"));
        assert_eq!(parse_price(None).unwrap(), Decimal::ZERO);
        assert!(parse_price(Some("gratuit")).is_err());
        assert!(parse_price(Some("-5")).is_err());
    }

    #[test]
    fn test_parse_quantity_variants() {
        assert_eq!(parse_quantity(None).unwrap(), 1);
        assert_eq!(parse_quantity(Some("3")).unwrap(), 3);
        assert_eq!(parse_quantity(Some("2.0")).unwrap(), 2);
        assert!(parse_quantity(Some("1.5")).is_err());
        assert!(parse_quantity(Some("0")).is_err());
        assert!(parse_quantity(Some("-2")).is_err());
    }

    #[test]
    fn test_parse_sheet_date_formats() {
        let expected = "2024-03-05T00:00:00+00:00";
        for raw in ["2024-03-05", "05/03/2024", "05-03-2024", "05.03.2024"] {
            assert_eq!(parse_sheet_date(raw).unwrap().to_rfc3339(), expected, "{raw}");
        }
        assert_eq!(
            parse_sheet_date("05/03/2024 14:30").unwrap().to_rfc3339(),
            "2024-03-05T14:30:00+00:00"
        );
        assert!(parse_sheet_date("2024-03-05T10:00:00+01:00").is_some());
        assert!(parse_sheet_date("demain").is_none());
    }
}
