use rusqlite_migration::{M, Migrations};

pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "CREATE TABLE datasets (
            name            TEXT PRIMARY KEY,
            location        TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE tables (
            dataset         TEXT NOT NULL,
            name            TEXT NOT NULL,
            columns_json    TEXT NOT NULL DEFAULT '[]',
            rows            INTEGER NOT NULL DEFAULT 0,
            last_loaded_at  TEXT,
            PRIMARY KEY (dataset, name),
            FOREIGN KEY (dataset) REFERENCES datasets(name)
        );

        CREATE TABLE load_jobs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset         TEXT NOT NULL,
            table_name      TEXT NOT NULL,
            source          TEXT NOT NULL,
            write_mode      TEXT NOT NULL,
            objects         INTEGER NOT NULL,
            rows_loaded     INTEGER NOT NULL,
            finished_at     TEXT NOT NULL
        );

        CREATE INDEX idx_load_jobs_table ON load_jobs(dataset, table_name);",
    )])
}
