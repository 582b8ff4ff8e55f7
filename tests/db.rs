use contatos::db::get_connection;

mod common;

#[test]
fn test_creates_and_removes_db_files() {
    let test_db = common::TestDb::new("test_connection.db");
    let conn = get_connection(&test_db.pool());
    assert!(conn.is_ok());
}
