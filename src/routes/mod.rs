pub mod upload;

use crate::{config::Config, repository::UploadRepository, storage::MediaStorage};
use actix_cors::Cors;
use actix_web::{http::header, web};

/// Registers the upload endpoint and, when enabled, the media file server.
pub fn configure(
    config: web::Data<Config>,
    storage: web::Data<MediaStorage>,
    repo: web::Data<dyn UploadRepository>,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |svc| {
        let media = config.serve_media.then(|| actix_files::Files::new("/media", storage.root()));

        svc.app_data(config)
            .app_data(storage)
            .app_data(repo)
            .service(
                web::resource("/upload/")
                    .route(web::post().to(upload::upload))
                    .default_service(web::to(upload::method_not_allowed)),
            );
        if let Some(files) = media {
            svc.service(files);
        }
    }
}

pub fn cors(cfg: &Config) -> Cors {
    let cors = if cfg.allowed_origins.is_empty() {
        Cors::permissive()
    } else {
        cfg.allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600)
}
