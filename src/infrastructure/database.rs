use crate::entities::{caches, collections, estates, masters, storages};
use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    info!("🔄 Running SeaORM auto-migrations...");
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let stmts = vec![
        schema
            .create_table_from_entity(estates::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(storages::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(collections::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(masters::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(caches::Entity)
            .if_not_exists()
            .to_owned(),
    ];

    for stmt in stmts {
        db.execute(builder.build(&stmt)).await?;
    }

    // Composite identity constraints the entity derive cannot express:
    // master identity and the derivative cache key.
    let indexes = vec![
        Index::create()
            .name("idx_masters_collection_signature")
            .table(masters::Entity)
            .col(masters::Column::CollectionId)
            .col(masters::Column::Signature)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_caches_master_action_params")
            .table(caches::Entity)
            .col(caches::Column::MasterId)
            .col(caches::Column::Action)
            .col(caches::Column::Params)
            .unique()
            .if_not_exists()
            .to_owned(),
    ];

    for index in indexes {
        db.execute(builder.build(&index)).await?;
    }

    info!("✅ Migrations complete");
    Ok(())
}
