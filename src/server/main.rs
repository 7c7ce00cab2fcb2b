use clap::Parser;
use multi_postgres::core::settings::SettingsLoader;
use multi_postgres::server::errors::ServiceError;
use multi_postgres::server::settings::{HttpServerCliOptions, Settings};
use multi_postgres::server::Application;
use multi_postgres::tracing::{get_subscriber, init_subscriber};

#[actix_web::main]
async fn main() -> Result<(), ServiceError> {
    let subscriber = get_subscriber("multi-postgres", "info", std::io::stdout);
    init_subscriber(subscriber);

    let main_span = tracing::info_span!("main");
    let _main_span_guard = main_span.enter();

    let options: HttpServerCliOptions = HttpServerCliOptions::parse();
    let settings = Settings::load(options)?;

    // dropping the build future abandons an in-flight connection attempt along with its pool
    let application = tokio::select! {
        built = Application::build(settings) => built,
        _ = tokio::signal::ctrl_c() => Err(ServiceError::Interrupted),
    };

    let application = match application {
        Ok(application) => application,
        Err(error) => {
            tracing::error!(?error, "service startup failed.");
            return Err(error);
        }
    };

    tracing::info!(
        port=%application.port(), datasource=%application.datasource(),
        "product service listening."
    );
    application.run_until_stopped().await?;
    Ok(())
}
