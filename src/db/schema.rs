/// Schema version this build writes. Databases stamped with a higher
/// `user_version` are refused rather than downgraded.
pub const SCHEMA_VERSION: i64 = 2;

/// Ordered schema migrations. Each entry runs once, in its own transaction,
/// when the stored `user_version` is below its version. Migrations only add.
pub const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        r#"
-- Pins: one geotagged photo each. AUTOINCREMENT keeps ids from being reused.
CREATE TABLE IF NOT EXISTS pins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lat REAL NOT NULL,
    lng REAL NOT NULL,
    created_at TEXT NOT NULL,
    image BLOB NOT NULL
);
"#,
    ),
    (
        2,
        r#"
-- Chronological access
CREATE INDEX IF NOT EXISTS idx_pins_created_at ON pins(created_at);
"#,
    ),
];
