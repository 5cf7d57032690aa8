//! EVE industry BOM planner
//!
//! Resolves manufacturing trees, raw material shopping lists and job
//! schedules from user recipes and the static data export.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;

use eve_bom::config::DEFAULT_MAX_DEPTH;
use eve_bom::models::{parse_material_list, Facility, ItemId, RecipeKind, UserRecipe};
use eve_bom::{
    db, flatten, logging, report, sde, sequence, BomEngine, EngineConfig, FacilityConstraints,
    RawMaterialClassifier, RecipeSource, SqliteRepository,
};

#[derive(Parser)]
#[command(name = "eve-bom")]
#[command(about = "Bill-of-materials and manufacturing planner for EVE Online industry")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, env = "EVE_BOM_DATABASE", default_value = "eve_bom.db")]
    database: PathBuf,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct QueryArgs {
    /// Item to build (e.g., "Kestrel")
    item: String,

    /// Number of units to build
    #[arg(short, long, default_value = "1")]
    quantity: f64,

    /// Material efficiency level to assume (default: each recipe's own)
    #[arg(long)]
    me: Option<u8>,

    /// Time efficiency level to assume (default: each recipe's own)
    #[arg(long)]
    te: Option<u8>,

    /// Recipe source to try first: user or sde
    #[arg(long)]
    source: Option<String>,

    /// Maximum expansion depth
    #[arg(long, env = "EVE_BOM_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load sample recipes and SDE rows for testing
    LoadSample,

    /// Import SDE CSV dumps (invTypes.csv, industryActivity*.csv)
    ImportSde {
        /// Directory containing the CSV files
        source_dir: PathBuf,

        /// Clear existing SDE data before import
        #[arg(long)]
        clear: bool,
    },

    /// Add or replace a user recipe
    AddRecipe {
        /// Item the recipe produces
        name: String,

        /// Materials per run, e.g. "Tritanium:2000,Pyerite:1000"
        #[arg(short, long)]
        materials: String,

        /// BPO, BPC or PI
        #[arg(long = "type", default_value = "BPO")]
        recipe_type: String,

        #[arg(long)]
        base_item: Option<String>,

        /// ME level the materials were recorded at
        #[arg(long, default_value_t = 0)]
        me: u8,

        /// TE level the time was recorded at
        #[arg(long, default_value_t = 0)]
        te: u8,

        #[arg(long, default_value_t = 1)]
        output_per_run: u32,

        /// Seconds per run
        #[arg(long)]
        time: Option<f64>,

        /// Items this recipe can be upgraded into
        #[arg(long = "upgrade")]
        upgrade_paths: Vec<String>,
    },

    /// Delete a user recipe
    RemoveRecipe {
        name: String,
    },

    /// List all user recipes
    ListRecipes,

    /// Mark an item as a raw material that is never expanded
    AddRaw {
        name: String,
    },

    /// Add or replace a facility
    AddFacility {
        name: String,

        #[arg(long)]
        system: Option<String>,

        #[arg(long, default_value_t = eve_bom::config::DEFAULT_MANUFACTURING_SLOTS)]
        slots: u32,

        #[arg(long, default_value_t = eve_bom::config::DEFAULT_RESEARCH_SLOTS)]
        research_slots: u32,

        /// Fraction of job time saved, e.g. 0.15
        #[arg(long, default_value_t = 0.0)]
        time_bonus: f64,
    },

    /// Show the production tree for an item
    Tree(QueryArgs),

    /// Show raw material totals for an item
    Flat(QueryArgs),

    /// Show the manufacturing job sequence for an item
    Schedule {
        #[command(flatten)]
        query: QueryArgs,

        /// Facility to read slots and bonuses from
        #[arg(long)]
        facility: Option<String>,

        #[arg(long)]
        slots: Option<u32>,

        #[arg(long)]
        research_slots: Option<u32>,

        #[arg(long)]
        time_bonus: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            load_sample_data(&conn)?;
            println!("Sample data loaded successfully!");
        }

        Commands::ImportSde { source_dir, clear } => {
            if clear {
                println!("Clearing existing SDE data...");
                db::clear_sde_data(&conn)?;
            }

            let stats = sde::import_directory(&conn, &source_dir)?;
            println!("{}", stats);
        }

        Commands::AddRecipe {
            name,
            materials,
            recipe_type,
            base_item,
            me,
            te,
            output_per_run,
            time,
            upgrade_paths,
        } => {
            let recipe = UserRecipe {
                name: ItemId::new(name.as_str())?,
                kind: recipe_type.parse()?,
                base_item,
                me_level: me,
                te_level: te,
                output_per_run: output_per_run.max(1),
                production_time_s: time,
                materials: parse_material_list(&name, &materials)?,
                upgrade_paths,
            };
            db::upsert_recipe(&conn, &recipe)?;
            println!("Saved recipe '{}' ({} materials)", recipe.name, recipe.materials.len());
        }

        Commands::RemoveRecipe { name } => {
            if !db::delete_recipe(&conn, &name)? {
                return Err(anyhow!("Recipe '{}' not found", name));
            }
            println!("Removed recipe '{}'", name);
        }

        Commands::ListRecipes => {
            let recipes = db::list_recipes(&conn)?;
            if recipes.is_empty() {
                println!("No recipes in database. Run 'add-recipe' or 'load-sample' first.");
            } else {
                println!("{:<36} {:>4} {:>4} {:>4} {:>6}  Materials", "Recipe", "Type", "ME", "TE", "Out");
                println!("{}", "-".repeat(72));
                for r in recipes {
                    println!(
                        "{:<36} {:>4} {:>4} {:>4} {:>6}  {}",
                        r.name.as_str(),
                        r.kind.as_str(),
                        r.me_level,
                        r.te_level,
                        r.output_per_run,
                        r.materials.len()
                    );
                }
            }
        }

        Commands::AddRaw { name } => {
            let item = ItemId::new(name)?;
            db::add_raw_material(&conn, &item)?;
            println!("'{}' will be treated as a raw material", item);
        }

        Commands::AddFacility {
            name,
            system,
            slots,
            research_slots,
            time_bonus,
        } => {
            let facility = Facility {
                name,
                system,
                manufacturing_slots: slots,
                research_slots,
                time_bonus_fraction: time_bonus,
            };
            FacilityConstraints::from(&facility).validate()?;
            db::upsert_facility(&conn, &facility)?;
            println!("Saved facility '{}'", facility.name);
        }

        Commands::Tree(query) => {
            let engine = open_engine(&conn, &query)?;
            let tree = engine.build(&engine.request(query.item.as_str(), query.quantity))?;

            if query.json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                print!("{}", report::format_tree(&tree, 0));
            }
        }

        Commands::Flat(query) => {
            let engine = open_engine(&conn, &query)?;
            let tree = engine.build(&engine.request(query.item.as_str(), query.quantity))?;
            let flat = flatten(&tree);

            if query.json {
                println!("{}", serde_json::to_string_pretty(&flat)?);
            } else {
                println!("{} x{}\n", tree.item_name, report::format_quantity(query.quantity));
                print!("{}", flat);
            }
        }

        Commands::Schedule {
            query,
            facility,
            slots,
            research_slots,
            time_bonus,
        } => {
            let mut constraints = match &facility {
                Some(name) => {
                    let facility = db::get_facility(&conn, name)?
                        .ok_or_else(|| anyhow!("Facility '{}' not found", name))?;
                    FacilityConstraints::from(&facility)
                }
                None => FacilityConstraints::default(),
            };
            if let Some(slots) = slots {
                constraints.manufacturing_slots = slots;
            }
            if let Some(slots) = research_slots {
                constraints.research_slots = slots;
            }
            if let Some(bonus) = time_bonus {
                constraints.facility_time_bonus_fraction = bonus;
            }

            let engine = open_engine(&conn, &query)?;
            let tree = engine.build(&engine.request(query.item.as_str(), query.quantity))?;
            let schedule = sequence(&tree, &constraints)?;

            if query.json {
                println!("{}", serde_json::to_string_pretty(&schedule)?);
            } else {
                print!("{}", schedule);
            }
        }
    }

    Ok(())
}

fn open_engine<'c>(conn: &'c Connection, query: &QueryArgs) -> Result<BomEngine<SqliteRepository<'c>>> {
    let mut classifier = RawMaterialClassifier::with_builtin();
    classifier.extend(db::list_raw_materials(conn)?);

    let config = EngineConfig {
        max_depth: query.max_depth,
        source_preference: query.source.as_deref().map(str::parse::<RecipeSource>).transpose()?,
        me_level: query.me,
        te_level: query.te,
    };

    Ok(BomEngine::new(SqliteRepository::new(conn), classifier, config))
}

/// Load a small slice of EVE industry data for testing without an SDE dump
fn load_sample_data(conn: &Connection) -> Result<()> {
    use eve_bom::db::MANUFACTURING_ACTIVITY;

    db::clear_sde_data(conn)?;

    let types: &[(i64, &str)] = &[
        (34, "Tritanium"),
        (35, "Pyerite"),
        (36, "Mexallon"),
        (37, "Isogen"),
        (38, "Nocxium"),
        (11399, "Morphite"),
        (499, "Light Missile Launcher I"),
        (810, "Light Missile Launcher I Blueprint"),
        (3380, "Industry"),
    ];
    for (type_id, name) in types {
        db::upsert_type(conn, *type_id, name)?;
    }

    // Light Missile Launcher I Blueprint: minerals -> 1 launcher in 10 minutes
    db::upsert_activity(conn, 810, MANUFACTURING_ACTIVITY, 600.0)?;
    db::upsert_activity_product(conn, 810, MANUFACTURING_ACTIVITY, 499, 1)?;
    for (material, quantity) in [(34, 475.0), (35, 156.0), (36, 63.0), (37, 5.0)] {
        db::upsert_activity_material(conn, 810, MANUFACTURING_ACTIVITY, material, quantity)?;
    }
    db::upsert_activity_skill(conn, 810, MANUFACTURING_ACTIVITY, 3380, 1)?;

    let recipes = [
        UserRecipe {
            name: ItemId::new("T2 Light Missile Launcher")?,
            kind: RecipeKind::Bpc,
            base_item: Some("Light Missile Launcher".to_string()),
            me_level: 2,
            te_level: 4,
            output_per_run: 1,
            production_time_s: Some(6000.0),
            materials: parse_material_list(
                "T2 Light Missile Launcher",
                "Tritanium:2000,Pyerite:1000,Mexallon:500,Isogen:200,Morphite:50",
            )?,
            upgrade_paths: vec!["Light Missile Launcher II".to_string()],
        },
        // Hybrid: a researched original whose launchers come from the SDE
        UserRecipe {
            name: ItemId::new("Kestrel")?,
            kind: RecipeKind::Bpo,
            base_item: None,
            me_level: 10,
            te_level: 20,
            output_per_run: 1,
            production_time_s: Some(4800.0),
            materials: parse_material_list(
                "Kestrel",
                "Light Missile Launcher I:4,Tritanium:27000,Pyerite:6300,Mexallon:2250,Isogen:450",
            )?,
            upgrade_paths: vec![],
        },
        UserRecipe {
            name: ItemId::new("Construction Blocks")?,
            kind: RecipeKind::Pi,
            base_item: None,
            me_level: 0,
            te_level: 0,
            output_per_run: 5,
            production_time_s: Some(3600.0),
            materials: parse_material_list("Construction Blocks", "Reactive Metals:40,Toxic Metals:40")?,
            upgrade_paths: vec![],
        },
    ];
    for recipe in &recipes {
        db::upsert_recipe(conn, recipe)?;
    }

    for raw in ["Reactive Metals", "Toxic Metals"] {
        db::add_raw_material(conn, &ItemId::new(raw)?)?;
    }

    db::upsert_facility(
        conn,
        &Facility {
            name: "Jita IV Raitaru".to_string(),
            system: Some("Jita".to_string()),
            manufacturing_slots: 10,
            research_slots: 10,
            time_bonus_fraction: 0.15,
        },
    )?;

    println!(
        "Loaded {} SDE types, {} recipes and 1 facility",
        types.len(),
        recipes.len()
    );
    Ok(())
}
