use duckdb::{Connection, Result as DuckResult};
use log::info;

pub const TABLE_NAME: &str = "imu_data";

pub struct DatabaseSchema;

impl DatabaseSchema {
    /// 幂等建表，启动时每次都会调用
    pub fn create_tables(conn: &Connection) -> DuckResult<()> {
        let existed = Self::table_exists(conn, TABLE_NAME)?;

        conn.execute("CREATE SEQUENCE IF NOT EXISTS imu_data_seq", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS imu_data (
                id BIGINT PRIMARY KEY DEFAULT nextval('imu_data_seq'),
                ax DOUBLE,
                ay DOUBLE,
                az DOUBLE,
                magnitude DOUBLE,
                \"timestamp\" VARCHAR
            )",
            [],
        )?;

        if existed {
            info!("Table {} already exists", TABLE_NAME);
        } else {
            info!("Created table {}", TABLE_NAME);
        }
        Ok(())
    }

    pub fn table_exists(conn: &Connection, table_name: &str) -> DuckResult<bool> {
        conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            [table_name],
            |row| Ok(row.get::<_, i64>(0)? > 0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!DatabaseSchema::table_exists(&conn, TABLE_NAME).unwrap());

        DatabaseSchema::create_tables(&conn).unwrap();
        DatabaseSchema::create_tables(&conn).unwrap();

        assert!(DatabaseSchema::table_exists(&conn, TABLE_NAME).unwrap());
    }
}
