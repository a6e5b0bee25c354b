use std::io::Write;

use super::model::Table;
use crate::error::Result;

/// Write `table` as comma-delimited text: one header row with the column
/// names in table order, then one line per row. No index column; nulls
/// become empty fields.
pub fn write_csv<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(ToString::to_string))?;
    }
    writer.flush()?;
    Ok(())
}

/// The CSV bytes for `table`, ready to hand to a download.
pub fn to_csv_bytes(table: &Table) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_csv(table, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::CellValue;

    #[test]
    fn test_empty_table_writes_header_only() {
        let table = Table::empty(vec!["source".into(), "hotspot".into()]);
        let bytes = to_csv_bytes(&table).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "source,hotspot\n");
    }

    #[test]
    fn test_rows_follow_column_order() {
        let table = Table::new(
            vec!["source".into(), "City".into(), "traffic_volume".into()],
            vec![
                vec!["a".into(), "Fort Worth, TX".into(), CellValue::Float(0.1)],
                vec!["b".into(), CellValue::Null, CellValue::Integer(12)],
            ],
        );
        let text = String::from_utf8(to_csv_bytes(&table).unwrap()).unwrap();
        assert_eq!(
            text,
            "source,City,traffic_volume\na,\"Fort Worth, TX\",0.1\nb,,12\n"
        );
    }
}
