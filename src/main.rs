mod bootstrap;
mod context;
mod error;
mod handlers;
mod middlewares;
mod models;
mod request;
mod response;
mod storer;
mod tokener;

use actix_web::guard;
use actix_web::web::{get, post, put, resource, Data};
use actix_web::HttpServer;
use sqlx::postgres::PgPoolOptions;

use middlewares::jwt::JwtGuard;
use storer::LocalStorer;
use tokener::Jwt;

#[actix_web::main]
async fn main() -> Result<(), std::io::Error> {
    dotenv::dotenv().ok();
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,actix_web=info");
    }
    env_logger::init();
    let secret = dotenv::var("JWT_SECRET").expect("environment variable JWT_SECRET not been set");
    let upload_path = dotenv::var("UPLOAD_PATH").expect("environment variable UPLOAD_PATH not been set");
    let database_url = dotenv::var("DATABASE_URL").expect("environment variable DATABASE_URL not been set");
    let bind_addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into());
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to database");
    bootstrap::ensure_admin(&pool).await.expect("admin bootstrap failed");
    let tokener = Jwt::new(secret.into_bytes());
    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(tokener.clone()))
            .app_data(Data::new(LocalStorer::new(&upload_path)))
            .service(resource("/signup").route(post().to(handlers::signup)))
            .service(resource("/login").route(post().to(handlers::login)))
            .service(resource("/jobs").guard(guard::Get()).route(get().to(handlers::job::list_open)))
            .service(
                resource("/jobs")
                    .guard(guard::Post())
                    .wrap(JwtGuard::new(tokener.clone()))
                    .route(post().to(handlers::job::create)),
            )
            .service(
                resource("/jobs/mine")
                    .wrap(JwtGuard::new(tokener.clone()))
                    .route(get().to(handlers::job::list_mine)),
            )
            .service(
                resource("/jobs/{job_id}/review")
                    .wrap(JwtGuard::new(tokener.clone()))
                    .route(put().to(handlers::job::review)),
            )
            .service(resource("/jobs/{job_id}").route(get().to(handlers::job::detail)))
            .service(
                resource("/applications")
                    .guard(guard::Post())
                    .route(post().to(handlers::application::submit::<LocalStorer>)),
            )
            .service(
                resource("/applications")
                    .guard(guard::Get())
                    .wrap(JwtGuard::new(tokener.clone()))
                    .route(get().to(handlers::application::list_for_employer)),
            )
            .service(
                resource("/applications/mine")
                    .wrap(JwtGuard::new(tokener.clone()))
                    .route(get().to(handlers::application::list_mine)),
            )
            .service(resource("/applications/public").route(get().to(handlers::application::public_lookup)))
            .service(
                resource("/applications/{application_id}/respond")
                    .wrap(JwtGuard::new(tokener.clone()))
                    .route(post().to(handlers::application::respond)),
            )
            .service(
                resource("/applications/{application_id}/reply")
                    .wrap(JwtGuard::new(tokener.clone()))
                    .route(post().to(handlers::application::reply)),
            )
            .service(
                resource("/uploads/{code}")
                    .wrap(JwtGuard::new(tokener.clone()))
                    .route(get().to(handlers::upload::fetch::<LocalStorer>)),
            )
    })
    .bind(bind_addr)?
    .run()
    .await
}
