use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer};
use sqlx::PgPool;
use tracing_actix_web::TracingLogger;

use crate::core::datasource::{ConnectionSource, DatasourceRole};
use errors::ServiceError;
use settings::Settings;

pub mod errors;
pub mod routes;
pub mod settings;

pub struct Application {
    port: u16,
    datasource: DatasourceRole,
    server: Server,
}

impl Application {
    /// Selects the datasource, then binds the HTTP listener. Nothing is served unless a datasource
    /// was selected.
    #[tracing::instrument(level = "info")]
    pub async fn build(settings: Settings) -> Result<Self, ServiceError> {
        let source = crate::core::select_connection_source(&settings.database).await?;
        tracing::info!(
            datasource=%source.role(), endpoint=%source.endpoint(),
            "datasource selected for the lifetime of the service."
        );

        if settings.database.migrate_on_startup {
            tracing::info!("running database migrations against {} datasource.", source.role());
            sqlx::migrate!("./migrations").run(source.pool()).await?;
        }

        let listener = TcpListener::bind(settings.application.address())?;
        let port = listener.local_addr()?.port();
        let datasource = source.role();
        let server = run(listener, source)?;
        Ok(Self { port, datasource, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn datasource(&self) -> DatasourceRole {
        self.datasource
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

fn run(listener: TcpListener, source: ConnectionSource<PgPool>) -> Result<Server, std::io::Error> {
    let role = Data::new(source.role());
    let db_pool = Data::new(source.into_pool());
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(routes::health_check))
            .service(
                web::scope("/products")
                    .route("", web::get().to(routes::list_products))
                    .route("", web::post().to(routes::create_product))
                    .route("/search", web::get().to(routes::search_products_by_name))
                    .route("/price", web::get().to(routes::search_products_by_price))
                    .route("/count", web::get().to(routes::count_products))
                    .route("/{id}", web::get().to(routes::get_product))
                    .route("/{id}", web::put().to(routes::update_product))
                    .route("/{id}", web::delete().to(routes::delete_product)),
            )
            .app_data(db_pool.clone())
            .app_data(role.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
