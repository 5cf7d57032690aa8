//! Database schema and operations

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{
    validate_materials, Facility, ItemId, RecipeKind, SdeRecipe, SkillRequirement, UserRecipe,
};

/// SDE activity id for manufacturing
pub const MANUFACTURING_ACTIVITY: i64 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- User-authored recipes (blueprint originals, copies, PI schematics)
        CREATE TABLE IF NOT EXISTS recipes (
            name TEXT PRIMARY KEY,
            recipe_type TEXT NOT NULL,
            base_item TEXT,
            me_level INTEGER NOT NULL DEFAULT 0,
            te_level INTEGER NOT NULL DEFAULT 0,
            output_per_run INTEGER NOT NULL DEFAULT 1,
            production_time_s REAL,
            materials_json TEXT NOT NULL DEFAULT '{}',
            upgrade_paths_json TEXT NOT NULL DEFAULT '[]'
        );

        -- Static data export tables
        CREATE TABLE IF NOT EXISTS types (
            type_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS industry_activity (
            type_id INTEGER,
            activity_id INTEGER,
            time REAL NOT NULL,
            PRIMARY KEY (type_id, activity_id)
        );

        CREATE TABLE IF NOT EXISTS industry_activity_materials (
            type_id INTEGER,
            activity_id INTEGER,
            material_type_id INTEGER,
            quantity REAL NOT NULL,
            PRIMARY KEY (type_id, activity_id, material_type_id)
        );

        CREATE TABLE IF NOT EXISTS industry_activity_products (
            type_id INTEGER,
            activity_id INTEGER,
            product_type_id INTEGER,
            quantity INTEGER NOT NULL,
            PRIMARY KEY (type_id, activity_id, product_type_id)
        );

        CREATE TABLE IF NOT EXISTS industry_activity_skills (
            type_id INTEGER,
            activity_id INTEGER,
            skill_id INTEGER,
            level INTEGER NOT NULL,
            PRIMARY KEY (type_id, activity_id, skill_id)
        );

        -- Items that are never expanded, on top of the built-in list
        CREATE TABLE IF NOT EXISTS raw_materials (
            name TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS facilities (
            name TEXT PRIMARY KEY,
            system TEXT,
            manufacturing_slots INTEGER NOT NULL,
            research_slots INTEGER NOT NULL,
            time_bonus_fraction REAL NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_types_name ON types(name);
        CREATE INDEX IF NOT EXISTS idx_products_product ON industry_activity_products(product_type_id);
        CREATE INDEX IF NOT EXISTS idx_recipes_type ON recipes(recipe_type);
        "#,
    )?;
    Ok(())
}

/// Insert or replace a user recipe
pub fn upsert_recipe(conn: &Connection, recipe: &UserRecipe) -> Result<()> {
    let materials: BTreeMap<&str, f64> = recipe
        .materials
        .iter()
        .map(|line| (line.item.as_str(), line.quantity))
        .collect();

    conn.execute(
        "INSERT OR REPLACE INTO recipes
         (name, recipe_type, base_item, me_level, te_level, output_per_run, production_time_s, materials_json, upgrade_paths_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        (
            recipe.name.as_str(),
            recipe.kind.as_str(),
            &recipe.base_item,
            recipe.me_level,
            recipe.te_level,
            recipe.output_per_run,
            recipe.production_time_s,
            serde_json::to_string(&materials)?,
            serde_json::to_string(&recipe.upgrade_paths)?,
        ),
    )?;
    Ok(())
}

const RECIPE_COLUMNS: &str = "name, recipe_type, base_item, me_level, te_level, output_per_run, production_time_s, materials_json, upgrade_paths_json";

struct RecipeRow {
    name: String,
    recipe_type: String,
    base_item: Option<String>,
    me_level: i64,
    te_level: i64,
    output_per_run: i64,
    production_time_s: Option<f64>,
    materials_json: String,
    upgrade_paths_json: String,
}

fn read_recipe_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecipeRow> {
    Ok(RecipeRow {
        name: row.get(0)?,
        recipe_type: row.get(1)?,
        base_item: row.get(2)?,
        me_level: row.get(3)?,
        te_level: row.get(4)?,
        output_per_run: row.get(5)?,
        production_time_s: row.get(6)?,
        materials_json: row.get(7)?,
        upgrade_paths_json: row.get(8)?,
    })
}

fn clamp_level(level: i64) -> u8 {
    level.clamp(0, i64::from(u8::MAX)) as u8
}

fn output_quantity(quantity: i64) -> u32 {
    u32::try_from(quantity).unwrap_or(1).max(1)
}

impl RecipeRow {
    fn into_recipe(self) -> Result<UserRecipe> {
        // Stored as a JSON object: {"Tritanium": 2000, ...}
        let raw: BTreeMap<String, f64> = serde_json::from_str(&self.materials_json)?;
        let materials = validate_materials(&self.name, raw)?;
        let upgrade_paths: Vec<String> = if self.upgrade_paths_json.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.upgrade_paths_json)?
        };

        Ok(UserRecipe {
            name: ItemId::new(self.name)?,
            // Unknown legacy values are treated as blueprint originals
            kind: self.recipe_type.parse().unwrap_or(RecipeKind::Bpo),
            base_item: self.base_item.filter(|s| !s.trim().is_empty()),
            me_level: clamp_level(self.me_level),
            te_level: clamp_level(self.te_level),
            output_per_run: output_quantity(self.output_per_run),
            production_time_s: self.production_time_s,
            materials,
            upgrade_paths,
        })
    }
}

/// Get the user recipe that produces `name`
pub fn get_recipe(conn: &Connection, name: &str) -> Result<Option<UserRecipe>> {
    let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE name = ?1");
    let row = conn
        .query_row(&sql, [name], read_recipe_row)
        .optional()?;
    row.map(RecipeRow::into_recipe).transpose()
}

/// List all user recipes
pub fn list_recipes(conn: &Connection) -> Result<Vec<UserRecipe>> {
    let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], read_recipe_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?.into_recipe()?);
    }
    Ok(results)
}

/// Delete a user recipe, returning whether it existed
pub fn delete_recipe(conn: &Connection, name: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM recipes WHERE name = ?1", [name])?;
    Ok(changed > 0)
}

/// Find the SDE manufacturing blueprint whose product is `product_name`.
///
/// When several blueprints produce the same item the lowest blueprint
/// type id wins.
pub fn find_sde_recipe(conn: &Connection, product_name: &str) -> Result<Option<SdeRecipe>> {
    let header = conn
        .query_row(
            "SELECT p.type_id, COALESCE(bt.name, ''), a.time, p.quantity, pt.name
             FROM industry_activity_products p
             JOIN types pt ON pt.type_id = p.product_type_id
             JOIN industry_activity a ON a.type_id = p.type_id AND a.activity_id = p.activity_id
             LEFT JOIN types bt ON bt.type_id = p.type_id
             WHERE pt.name = ?1 AND p.activity_id = ?2
             ORDER BY p.type_id
             LIMIT 1",
            (product_name, MANUFACTURING_ACTIVITY),
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((blueprint_type_id, blueprint_name, base_time_s, quantity, product)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT mt.name, m.quantity
         FROM industry_activity_materials m
         JOIN types mt ON mt.type_id = m.material_type_id
         WHERE m.type_id = ?1 AND m.activity_id = ?2
         ORDER BY m.material_type_id",
    )?;
    let rows = stmt.query_map((blueprint_type_id, MANUFACTURING_ACTIVITY), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })?;
    let mut raw = Vec::new();
    for row in rows {
        raw.push(row?);
    }
    let materials = validate_materials(&product, raw)?;

    let mut stmt = conn.prepare(
        "SELECT skill_id, level FROM industry_activity_skills
         WHERE type_id = ?1 AND activity_id = ?2
         ORDER BY skill_id",
    )?;
    let rows = stmt.query_map((blueprint_type_id, MANUFACTURING_ACTIVITY), |row| {
        Ok(SkillRequirement {
            skill_type_id: row.get(0)?,
            level: clamp_level(row.get(1)?),
        })
    })?;
    let mut skills = Vec::new();
    for row in rows {
        skills.push(row?);
    }

    Ok(Some(SdeRecipe {
        blueprint_type_id,
        blueprint_name,
        product: ItemId::new(product)?,
        output_per_run: output_quantity(quantity),
        base_time_s,
        materials,
        skills,
    }))
}

/// Insert or replace an SDE type name
pub fn upsert_type(conn: &Connection, type_id: i64, name: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO types (type_id, name) VALUES (?1, ?2)",
        (type_id, name),
    )?;
    Ok(())
}

pub fn upsert_activity(conn: &Connection, type_id: i64, activity_id: i64, time: f64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO industry_activity (type_id, activity_id, time) VALUES (?1, ?2, ?3)",
        (type_id, activity_id, time),
    )?;
    Ok(())
}

pub fn upsert_activity_material(
    conn: &Connection,
    type_id: i64,
    activity_id: i64,
    material_type_id: i64,
    quantity: f64,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO industry_activity_materials (type_id, activity_id, material_type_id, quantity)
         VALUES (?1, ?2, ?3, ?4)",
        (type_id, activity_id, material_type_id, quantity),
    )?;
    Ok(())
}

pub fn upsert_activity_product(
    conn: &Connection,
    type_id: i64,
    activity_id: i64,
    product_type_id: i64,
    quantity: i64,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO industry_activity_products (type_id, activity_id, product_type_id, quantity)
         VALUES (?1, ?2, ?3, ?4)",
        (type_id, activity_id, product_type_id, quantity),
    )?;
    Ok(())
}

pub fn upsert_activity_skill(
    conn: &Connection,
    type_id: i64,
    activity_id: i64,
    skill_id: i64,
    level: i64,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO industry_activity_skills (type_id, activity_id, skill_id, level)
         VALUES (?1, ?2, ?3, ?4)",
        (type_id, activity_id, skill_id, level),
    )?;
    Ok(())
}

/// Clear all imported SDE data (for re-import)
pub fn clear_sde_data(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM industry_activity_skills;
        DELETE FROM industry_activity_products;
        DELETE FROM industry_activity_materials;
        DELETE FROM industry_activity;
        DELETE FROM types;
        "#,
    )?;
    Ok(())
}

/// List all products with an SDE manufacturing blueprint
pub fn list_sde_products(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT pt.name
         FROM industry_activity_products p
         JOIN types pt ON pt.type_id = p.product_type_id
         WHERE p.activity_id = ?1
         ORDER BY pt.name",
    )?;

    let rows = stmt.query_map([MANUFACTURING_ACTIVITY], |row| row.get(0))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn add_raw_material(conn: &Connection, name: &ItemId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO raw_materials (name) VALUES (?1)",
        [name.as_str()],
    )?;
    Ok(())
}

/// Raw materials added on top of the built-in allow-list
pub fn list_raw_materials(conn: &Connection) -> Result<Vec<ItemId>> {
    let mut stmt = conn.prepare("SELECT name FROM raw_materials ORDER BY name")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(ItemId::new(row?)?);
    }
    Ok(results)
}

pub fn upsert_facility(conn: &Connection, facility: &Facility) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO facilities (name, system, manufacturing_slots, research_slots, time_bonus_fraction)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            &facility.name,
            &facility.system,
            facility.manufacturing_slots,
            facility.research_slots,
            facility.time_bonus_fraction,
        ),
    )?;
    Ok(())
}

pub fn get_facility(conn: &Connection, name: &str) -> Result<Option<Facility>> {
    let facility = conn
        .query_row(
            "SELECT name, system, manufacturing_slots, research_slots, time_bonus_fraction
             FROM facilities WHERE name = ?1",
            [name],
            |row| {
                Ok(Facility {
                    name: row.get(0)?,
                    system: row.get(1)?,
                    manufacturing_slots: row.get(2)?,
                    research_slots: row.get(3)?,
                    time_bonus_fraction: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(facility)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn item(name: &str) -> ItemId {
        ItemId::new(name).unwrap()
    }

    #[test]
    fn recipe_survives_storage() {
        let conn = memory_db();
        let recipe = UserRecipe {
            name: item("T2 Light Missile Launcher"),
            kind: RecipeKind::Bpc,
            base_item: Some("Light Missile Launcher".to_string()),
            me_level: 2,
            te_level: 4,
            output_per_run: 1,
            production_time_s: Some(6000.0),
            materials: validate_materials("T2", vec![("Tritanium", 2000.0), ("Morphite", 50.0)])
                .unwrap(),
            upgrade_paths: vec!["Light Missile Launcher II".to_string()],
        };
        upsert_recipe(&conn, &recipe).unwrap();

        let loaded = get_recipe(&conn, "T2 Light Missile Launcher").unwrap().unwrap();
        assert_eq!(loaded.kind, RecipeKind::Bpc);
        assert_eq!(loaded.me_level, 2);
        assert_eq!(loaded.upgrade_paths, recipe.upgrade_paths);
        // JSON objects come back in key order
        let names: Vec<_> = loaded.materials.iter().map(|l| l.item.as_str()).collect();
        assert_eq!(names, vec!["Morphite", "Tritanium"]);

        assert!(get_recipe(&conn, "Nothing").unwrap().is_none());
        assert_eq!(list_recipes(&conn).unwrap().len(), 1);
        assert!(delete_recipe(&conn, "T2 Light Missile Launcher").unwrap());
        assert!(list_recipes(&conn).unwrap().is_empty());
    }

    #[test]
    fn malformed_material_json_is_rejected() {
        let conn = memory_db();
        conn.execute(
            "INSERT INTO recipes (name, recipe_type, materials_json) VALUES ('Bad', 'BPO', '{\"Tritanium\": -3}')",
            [],
        )
        .unwrap();
        assert!(get_recipe(&conn, "Bad").is_err());

        conn.execute(
            "INSERT INTO recipes (name, recipe_type, materials_json) VALUES ('Broken', 'BPO', 'not json')",
            [],
        )
        .unwrap();
        assert!(get_recipe(&conn, "Broken").is_err());
    }

    #[test]
    fn sde_lookup_prefers_lowest_blueprint_id() {
        let conn = memory_db();
        upsert_type(&conn, 34, "Tritanium").unwrap();
        upsert_type(&conn, 35, "Pyerite").unwrap();
        upsert_type(&conn, 499, "Light Missile Launcher I").unwrap();
        upsert_type(&conn, 810, "Light Missile Launcher I Blueprint").unwrap();
        upsert_type(&conn, 900, "Light Missile Launcher I Blueprint (Faction)").unwrap();

        for (bp, trit) in [(900, 9.0), (810, 8.0)] {
            upsert_activity(&conn, bp, MANUFACTURING_ACTIVITY, 600.0).unwrap();
            upsert_activity_product(&conn, bp, MANUFACTURING_ACTIVITY, 499, 1).unwrap();
            upsert_activity_material(&conn, bp, MANUFACTURING_ACTIVITY, 34, trit).unwrap();
        }
        upsert_activity_material(&conn, 810, MANUFACTURING_ACTIVITY, 35, 4.0).unwrap();
        upsert_activity_skill(&conn, 810, MANUFACTURING_ACTIVITY, 3380, 1).unwrap();

        let recipe = find_sde_recipe(&conn, "Light Missile Launcher I").unwrap().unwrap();
        assert_eq!(recipe.blueprint_type_id, 810);
        assert_eq!(recipe.blueprint_name, "Light Missile Launcher I Blueprint");
        assert_eq!(recipe.base_time_s, 600.0);
        assert_eq!(recipe.materials.len(), 2);
        assert_eq!(recipe.materials[0].item.as_str(), "Tritanium");
        assert_eq!(recipe.materials[0].quantity, 8.0);
        assert_eq!(recipe.skills.len(), 1);

        assert!(find_sde_recipe(&conn, "Tritanium").unwrap().is_none());
        assert_eq!(list_sde_products(&conn).unwrap(), vec!["Light Missile Launcher I"]);

        clear_sde_data(&conn).unwrap();
        assert!(find_sde_recipe(&conn, "Light Missile Launcher I").unwrap().is_none());
    }

    #[test]
    fn raw_materials_and_facilities() {
        let conn = memory_db();
        add_raw_material(&conn, &item("Compressed Veldspar")).unwrap();
        add_raw_material(&conn, &item("Compressed Veldspar")).unwrap();
        assert_eq!(list_raw_materials(&conn).unwrap(), vec![item("Compressed Veldspar")]);

        let facility = Facility {
            name: "Jita Raitaru".to_string(),
            system: Some("Jita".to_string()),
            manufacturing_slots: 5,
            research_slots: 2,
            time_bonus_fraction: 0.15,
        };
        upsert_facility(&conn, &facility).unwrap();
        assert_eq!(get_facility(&conn, "Jita Raitaru").unwrap(), Some(facility));
        assert!(get_facility(&conn, "Amarr").unwrap().is_none());
    }
}
