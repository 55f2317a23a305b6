//! Table DDL generation from the explicit column descriptors in `ride-types`.
//!
//! Replaces the source's runtime struct-tag reflection with a plain fold over a `const` slice;
//! an unrecognized semantic type simply cannot occur here because [`ride_types::SqlType`] is a
//! closed enum, so the "hard error at startup on unknown semantic type" requirement is enforced
//! by the type system rather than at runtime.

use ride_types::ColumnDescriptor;

pub fn create_table_ddl(table: &str, columns: &[ColumnDescriptor]) -> String {
    let body = columns
        .iter()
        .map(|column| format!("{} {}", column.name, column.ty.as_ddl()))
        .collect::<Vec<_>>()
        .join(", ");

    format!("CREATE TABLE IF NOT EXISTS {table} ({body})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ride_types::RIDE_COLUMNS;

    #[test]
    fn generates_one_column_per_descriptor() {
        let ddl = create_table_ddl("ride", RIDE_COLUMNS);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS ride ("));
        assert!(ddl.contains("id SERIAL PRIMARY KEY"));
        assert!(ddl.contains("driver_id INTEGER"));
        assert!(ddl.contains("price FLOAT NOT NULL"));
    }
}
