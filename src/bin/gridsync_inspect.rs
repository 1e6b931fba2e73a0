//! Print the type catalog stored in a file store directory
//!
//! Run with: cargo run --bin gridsync-inspect -- --dir ./gridsync_data

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use gridsync::codec::{encoded_version, MetadataRecord};
use gridsync::store::CollectionHandle;
use gridsync::{CatalogConfig, FileStore, MetadataCatalog, TypeDescriptor, TypeResolver};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "gridsync-inspect", about = "Inspect a persisted type catalog")]
struct Args {
    /// Root directory of the file store
    #[arg(long)]
    dir: PathBuf,

    /// Metadata collection name
    #[arg(long, default_value = "metadata")]
    collection: String,

    /// Extra type names to treat as resolvable
    #[arg(long = "known-type")]
    known_types: Vec<String>,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Print each record's encoding version instead of loading the catalog
    #[arg(long)]
    versions: bool,
}

fn print_versions(store: &FileStore, collection: &str) -> Result<()> {
    let collection = store.file_collection(collection)?;
    for document in collection.find()? {
        let record = MetadataRecord::from_document(&document?)?;
        match encoded_version(&record.payload) {
            Ok(version) => println!("{}\tv{}", record.type_name, version),
            Err(e) => println!("{}\tunreadable ({})", record.type_name, e),
        }
    }
    Ok(())
}

fn print_text(types: &[Arc<TypeDescriptor>]) {
    for t in types {
        println!("{}", t.type_name);
        if let Some(super_type) = &t.super_type_name {
            println!("  extends {}", super_type);
        }
        for p in &t.properties {
            let mut marks = Vec::new();
            if t.id_property.as_deref() == Some(p.name.as_str()) {
                marks.push("id");
            }
            if t.routing_property.as_deref() == Some(p.name.as_str()) {
                marks.push("routing");
            }
            if marks.is_empty() {
                println!("  {}: {}", p.name, p.type_name);
            } else {
                println!("  {}: {} [{}]", p.name, p.type_name, marks.join(", "));
            }
        }
        for i in &t.indexes {
            println!(
                "  index {} ({:?}{})",
                i.name(),
                i.kind,
                if i.unique { ", unique" } else { "" }
            );
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let store = FileStore::open(&args.dir)
        .with_context(|| format!("opening store at {}", args.dir.display()))?;

    if args.versions {
        return print_versions(&store, &args.collection);
    }

    let mut resolver = TypeResolver::default();
    for name in &args.known_types {
        resolver.register(name.as_str());
    }

    let config = CatalogConfig {
        collection_name: args.collection.clone(),
        ..CatalogConfig::default()
    };
    config.validate()?;

    let catalog = MetadataCatalog::new(Arc::new(store), config).with_resolver(resolver);
    let types = catalog
        .load_metadata()
        .with_context(|| format!("loading '{}'", args.collection))?;

    match args.format {
        Format::Text => print_text(&types),
        Format::Json => {
            let plain: Vec<&TypeDescriptor> = types.iter().map(|t| t.as_ref()).collect();
            println!("{}", serde_json::to_string_pretty(&plain)?);
        }
    }

    catalog.close()?;
    Ok(())
}
