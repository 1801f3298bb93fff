//! Shared container bootstrap for the ignored, Docker-backed integration
//! tests in `live_integration.rs`. Grounded on
//! `dbflux_test_support::containers::with_mongodb_url`.

use testcontainers::clients::Cli;
use testcontainers::core::WaitFor;
use testcontainers::GenericImage;

/// Starts a throwaway `mongo:7` container, hands its connection string to
/// `run`, and tears the container down once `run` returns.
pub fn with_mongodb_url<T, F>(run: F) -> T
where
    F: FnOnce(String) -> T,
{
    let docker = Cli::default();
    let image = GenericImage::new("mongo", "7")
        .with_exposed_port(27017)
        .with_wait_for(WaitFor::message_on_stdout("Waiting for connections"));

    let container = docker.run(image);
    let port = container.get_host_port_ipv4(27017);
    let url = format!("mongodb://127.0.0.1:{port}/testdb");

    run(url)
}
