//! Static data export import
//!
//! Loads the industry tables of the SDE CSV dump (`invTypes.csv`,
//! `industryActivity*.csv`) into the local store.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::db;

/// SDE tables the importer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SdeTable {
    Types,
    Activity,
    Materials,
    Products,
    Skills,
}

impl SdeTable {
    pub fn file_name(&self) -> &'static str {
        match self {
            SdeTable::Types => "invTypes.csv",
            SdeTable::Activity => "industryActivity.csv",
            SdeTable::Materials => "industryActivityMaterials.csv",
            SdeTable::Products => "industryActivityProducts.csv",
            SdeTable::Skills => "industryActivitySkills.csv",
        }
    }

    fn from_file_name(name: &str) -> Option<Self> {
        [
            SdeTable::Types,
            SdeTable::Activity,
            SdeTable::Materials,
            SdeTable::Products,
            SdeTable::Skills,
        ]
        .into_iter()
        .find(|table| table.file_name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Deserialize)]
struct TypeRow {
    #[serde(rename = "typeID")]
    type_id: i64,
    #[serde(rename = "typeName", default)]
    type_name: String,
}

#[derive(Debug, Deserialize)]
struct ActivityRow {
    #[serde(rename = "typeID")]
    type_id: i64,
    #[serde(rename = "activityID")]
    activity_id: i64,
    time: f64,
}

#[derive(Debug, Deserialize)]
struct MaterialRow {
    #[serde(rename = "typeID")]
    type_id: i64,
    #[serde(rename = "activityID")]
    activity_id: i64,
    #[serde(rename = "materialTypeID")]
    material_type_id: i64,
    quantity: f64,
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    #[serde(rename = "typeID")]
    type_id: i64,
    #[serde(rename = "activityID")]
    activity_id: i64,
    #[serde(rename = "productTypeID")]
    product_type_id: i64,
    quantity: i64,
}

#[derive(Debug, Deserialize)]
struct SkillRow {
    #[serde(rename = "typeID")]
    type_id: i64,
    #[serde(rename = "activityID")]
    activity_id: i64,
    #[serde(rename = "skillID")]
    skill_id: i64,
    level: i64,
}

/// Find the SDE CSV files under `dir`, in dependency order
pub fn find_sde_files(dir: &Path) -> Result<Vec<(SdeTable, PathBuf)>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if let Some(table) = SdeTable::from_file_name(filename) {
            if files.iter().any(|(seen, _)| *seen == table) {
                warn!(file = %path.display(), "duplicate SDE file ignored");
                continue;
            }
            files.push((table, path.to_path_buf()));
        }
    }

    files.sort_by_key(|(table, _)| *table);
    Ok(files)
}

/// Import every recognised SDE file under `dir` in one transaction
pub fn import_directory(conn: &Connection, dir: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    info!(dir = %dir.display(), "scanning for SDE files");
    let files = find_sde_files(dir)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "no SDE files found");
    }

    let tx = conn.unchecked_transaction()?;
    for (table, path) in &files {
        let imported = import_file(&tx, *table, path, &mut stats)
            .with_context(|| format!("Failed to import {}", path.display()))?;
        info!(file = %path.display(), rows = imported, "imported");
        stats.files += 1;
    }
    tx.commit()?;

    Ok(stats)
}

fn import_file(conn: &Connection, table: SdeTable, path: &Path, stats: &mut ImportStats) -> Result<usize> {
    let imported = match table {
        SdeTable::Types => {
            let n = load_rows(path, stats, |r: &TypeRow| insert_type(conn, r))?;
            stats.types += n;
            n
        }
        SdeTable::Activity => {
            let n = load_rows(path, stats, |r: &ActivityRow| {
                db::upsert_activity(conn, r.type_id, r.activity_id, r.time).map(|_| true)
            })?;
            stats.activities += n;
            n
        }
        SdeTable::Materials => {
            let n = load_rows(path, stats, |r: &MaterialRow| insert_material(conn, r))?;
            stats.materials += n;
            n
        }
        SdeTable::Products => {
            let n = load_rows(path, stats, |r: &ProductRow| {
                db::upsert_activity_product(conn, r.type_id, r.activity_id, r.product_type_id, r.quantity)
                    .map(|_| true)
            })?;
            stats.products += n;
            n
        }
        SdeTable::Skills => {
            let n = load_rows(path, stats, |r: &SkillRow| {
                db::upsert_activity_skill(conn, r.type_id, r.activity_id, r.skill_id, r.level).map(|_| true)
            })?;
            stats.skills += n;
            n
        }
    };
    Ok(imported)
}

/// Deserialize each row of `path` and hand it to `insert`.
///
/// Rows that fail to parse, or that `insert` declines, count as skipped.
fn load_rows<T, F>(path: &Path, stats: &mut ImportStats, mut insert: F) -> Result<usize>
where
    T: DeserializeOwned,
    F: FnMut(&T) -> crate::error::Result<bool>,
{
    let mut reader = csv::Reader::from_path(path)?;
    let mut imported = 0;

    for result in reader.deserialize::<T>() {
        match result {
            Ok(row) => {
                if insert(&row)? {
                    imported += 1;
                } else {
                    stats.skipped += 1;
                }
            }
            Err(e) => {
                debug!(file = %path.display(), error = %e, "malformed row skipped");
                stats.skipped += 1;
            }
        }
    }

    Ok(imported)
}

fn insert_type(conn: &Connection, row: &TypeRow) -> crate::error::Result<bool> {
    let name = row.type_name.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("nan") {
        return Ok(false);
    }
    db::upsert_type(conn, row.type_id, name)?;
    Ok(true)
}

fn insert_material(conn: &Connection, row: &MaterialRow) -> crate::error::Result<bool> {
    if !row.quantity.is_finite() || row.quantity <= 0.0 {
        return Ok(false);
    }
    db::upsert_activity_material(conn, row.type_id, row.activity_id, row.material_type_id, row.quantity)?;
    Ok(true)
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub files: usize,
    pub types: usize,
    pub activities: usize,
    pub materials: usize,
    pub products: usize,
    pub skills: usize,
    pub skipped: usize,
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Imported {} files: {} types, {} activities, {} materials, {} products, {} skills. Skipped: {}",
            self.files,
            self.types,
            self.activities,
            self.materials,
            self.products,
            self.skills,
            self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn imports_dump_and_resolves_recipe() {
        let tmp = tempdir().unwrap();
        let nested = tmp.path().join("sde").join("csv");
        fs::create_dir_all(&nested).unwrap();

        write(
            &nested,
            "invTypes.csv",
            "typeID,groupID,typeName,volume\n34,18,Tritanium,0.01\n35,18,Pyerite,0.01\n499,511,Light Missile Launcher I,5\n810,136,Light Missile Launcher I Blueprint,0.01\n999,1,nan,0\n",
        );
        write(&nested, "industryActivity.csv", "typeID,activityID,time\n810,1,600\n810,3,210\n");
        write(
            &nested,
            "industryActivityMaterials.csv",
            "typeID,activityID,materialTypeID,quantity\n810,1,34,1500\n810,1,35,400\nbroken,row,here,x\n",
        );
        write(
            &nested,
            "industryActivityProducts.csv",
            "typeID,activityID,productTypeID,quantity\n810,1,499,1\n",
        );
        write(&nested, "notes.txt", "ignored");

        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let stats = import_directory(&conn, tmp.path()).unwrap();

        assert_eq!(stats.files, 4);
        assert_eq!(stats.types, 4);
        assert_eq!(stats.activities, 2);
        assert_eq!(stats.materials, 2);
        assert_eq!(stats.products, 1);
        assert_eq!(stats.skipped, 2);

        let recipe = db::find_sde_recipe(&conn, "Light Missile Launcher I").unwrap().unwrap();
        assert_eq!(recipe.base_time_s, 600.0);
        assert_eq!(recipe.materials.len(), 2);
        assert!(stats.to_string().starts_with("Imported 4 files"));
    }

    #[test]
    fn empty_directory_imports_nothing() {
        let tmp = tempdir().unwrap();
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let stats = import_directory(&conn, tmp.path()).unwrap();
        assert_eq!(stats.files, 0);
    }
}
