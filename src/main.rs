use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use env_logger::Env;
use std::sync::Arc;
use uploader::config::Config;
use uploader::db::Db;
use uploader::repository::{SqliteUploadRepository, UploadRepository};
use uploader::routes;
use uploader::storage::MediaStorage;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Init logger to show info by default, but can be overridden by RUST_LOG
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cfg = Config::from_env_config()?;

    let db = Db::connect_and_migrate(&cfg.database_path).await?;
    let repo: Arc<dyn UploadRepository> = Arc::new(SqliteUploadRepository::new(db));
    let repo = web::Data::from(repo);
    let storage = web::Data::new(MediaStorage::new(&cfg.media_root));
    log::info!("Starting server at {}, media root {}", cfg.listen, cfg.media_root);

    let listen_addr = cfg.listen.clone();
    let config = web::Data::new(cfg);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(routes::cors(&config))
            .configure(routes::configure(config.clone(), storage.clone(), repo.clone()))
    })
    .bind(listen_addr)?
    .run()
    .await?;
    Ok(())
}
