#[rocket::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let rocket = match lineheat_server::build() {
        Ok(rocket) => rocket,
        Err(err) => {
            tracing::error!(error = %err, "failed to start");
            std::process::exit(1);
        }
    };

    if let Err(err) = rocket.launch().await {
        tracing::error!(error = %err, "server terminated with an error");
        std::process::exit(1);
    }
}
