use anyhow::{anyhow, Context, Result};
use ldk_schemas::LeadExportRow;
use serde::Serialize;

pub const EXPORT_HEADER: [&str; 3] = ["Phone Number", "State", "Order Number"];

/// Leads bound to a fulfilled order, ready to be written out.
#[derive(Debug, Clone, Serialize)]
pub struct OrderExport {
    pub order_id: i64,
    pub order_number: String,
    pub rows: Vec<LeadExportRow>,
}

impl OrderExport {
    /// Download file name offered to the client.
    pub fn file_name(&self) -> String {
        format!("order_{}_export.csv", self.order_number)
    }

    pub fn to_csv(&self) -> Result<String> {
        render_csv(&self.rows)
    }
}

/// Render rows as CSV with the fixed header, one line per lead.
pub fn render_csv(rows: &[LeadExportRow]) -> Result<String> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(EXPORT_HEADER).context("csv header write failed")?;
    for r in rows {
        w.write_record([&r.phone_number, &r.state, &r.order_number])
            .context("csv row write failed")?;
    }
    let bytes = w
        .into_inner()
        .map_err(|e| anyhow!("csv flush failed: {}", e.error()))?;
    String::from_utf8(bytes).context("csv output is not utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_rows_in_given_order() {
        let rows = vec![
            LeadExportRow {
                phone_number: "5550000001".into(),
                state: "FL".into(),
                order_number: "ORD,1".into(),
            },
            LeadExportRow {
                phone_number: "5550000002".into(),
                state: "TX".into(),
                order_number: "ORD,1".into(),
            },
        ];
        let out = render_csv(&rows).unwrap();
        assert_eq!(
            out,
            "Phone Number,State,Order Number\n5550000001,FL,\"ORD,1\"\n5550000002,TX,\"ORD,1\"\n"
        );
    }

    #[test]
    fn empty_export_is_header_only() {
        assert_eq!(render_csv(&[]).unwrap(), "Phone Number,State,Order Number\n");
    }
}
