// Convert wire levels into PriceLevels.
// Feeds send numbers or numeric strings, as [price, size, ..] arrays or
// {"px", "sz"} objects. Anything else rejects the whole side.

use serde_json::Value;

use crate::engine::types::PriceLevel;
use crate::error::NormaliseError;

pub struct Normaliser;

impl Normaliser {
    pub fn parse_side(side: &'static str, raw: &Value) -> Result<Vec<PriceLevel>, NormaliseError> {
        let entries = raw.as_array().ok_or(NormaliseError::NotAList { side })?;
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                Self::parse_level(entry).map_err(|reason| NormaliseError::MalformedLevel { side, index, reason })
            })
            .collect()
    }

    fn parse_level(entry: &Value) -> Result<PriceLevel, String> {
        let (px, sz) = match entry {
            Value::Array(items) if items.len() >= 2 => (&items[0], &items[1]),
            Value::Array(items) => return Err(format!("expected [price, size], got {} items", items.len())),
            Value::Object(map) => match (map.get("px"), map.get("sz")) {
                (Some(px), Some(sz)) => (px, sz),
                _ => return Err("object level without px/sz".to_string()),
            },
            other => return Err(format!("unexpected level shape: {other}")),
        };

        let price = Self::parse_number(px).map_err(|e| format!("price {e}"))?;
        let size = Self::parse_number(sz).map_err(|e| format!("size {e}"))?;
        if size < 0.0 {
            return Err(format!("size {size} is negative"));
        }
        Ok(PriceLevel { price, size })
    }

    fn parse_number(value: &Value) -> Result<f64, String> {
        let parsed = match value {
            Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is out of range"))?,
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("'{s}' is not numeric"))?,
            other => return Err(format!("{other} is not numeric")),
        };
        if !parsed.is_finite() {
            return Err(format!("{parsed} is not finite"));
        }
        Ok(parsed)
    }
}
