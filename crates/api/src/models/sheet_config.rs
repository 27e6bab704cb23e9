//! Saved spreadsheet sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use livraison_core::{SheetConfigId, UserId};

/// Tab name used when a config does not name one.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// A named pointer at a spreadsheet tab. At most one is active.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetConfig {
    pub id: SheetConfigId,
    pub name: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub description: String,
    pub is_active: bool,
    pub created_by: Option<UserId>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of the create and update config endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetConfigInput {
    pub name: String,
    pub spreadsheet_id: String,
    #[serde(default)]
    pub sheet_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SheetConfigInput {
    /// Trim fields and apply defaults, collecting field-level errors.
    ///
    /// # Errors
    ///
    /// Returns `(field, message)` pairs for every invalid field.
    pub fn normalize(self) -> Result<Self, Vec<(&'static str, String)>> {
        let mut errors = Vec::new();
        let name = self.name.trim().to_string();
        if name.is_empty() {
            errors.push(("name", "name is required".to_string()));
        }
        let spreadsheet_id = self.spreadsheet_id.trim().to_string();
        if spreadsheet_id.is_empty() {
            errors.push(("spreadsheetId", "spreadsheetId is required".to_string()));
        } else if spreadsheet_id.contains(['/', ' ']) {
            errors.push((
                "spreadsheetId",
                "use the id from the spreadsheet URL, not the full URL".to_string(),
            ));
        } else if spreadsheet_id.contains(':') {
            errors.push((
                "spreadsheetId",
                "spreadsheetId cannot contain ':'".to_string(),
            ));
        }
        let sheet_name = self
            .sheet_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string());

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Self {
            name,
            spreadsheet_id,
            sheet_name: Some(sheet_name),
            description: Some(self.description.unwrap_or_default().trim().to_string()),
        })
    }

    #[must_use]
    pub fn sheet_name(&self) -> &str {
        self.sheet_name.as_deref().unwrap_or(DEFAULT_SHEET_NAME)
    }

    #[must_use]
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }
}
