use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use log::info;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use structopt::StructOpt;

use fake_detect::{ClassifierOpts, NormalizerOpts};

mod body;
mod service;

use service::AppState;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "fake-detect-http",
    about = "HTTP relay answering whether an image is real or AI-generated"
)]
struct CmdArgs {
    #[structopt(long, env = "HOST", default_value = "0.0.0.0", help = "Address to bind")]
    host: IpAddr,

    #[structopt(long, env = "PORT", default_value = "5000", help = "Port to listen on")]
    port: u16,

    #[structopt(
        long,
        env = "MAX_BODY_BYTES",
        default_value = "10485760",
        help = "Largest accepted /analyze body"
    )]
    max_body_bytes: usize,

    #[structopt(flatten)]
    classifier: ClassifierOpts,

    #[structopt(flatten)]
    normalizer: NormalizerOpts,
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let state = Arc::new(AppState {
        classifier: args.classifier.build()?,
        normalizer: args.normalizer.build()?,
        max_body_bytes: args.max_body_bytes,
    });

    info!(
        "Serving verdicts from {} ({} backend)",
        state.classifier.name(),
        state.classifier.backend()
    );

    // A `MakeService` that produces a `Service` to handle each connection.
    let make_service = make_service_fn(move |_conn: &AddrStream| {
        let state = Arc::clone(&state);

        let service = service_fn(move |req| service::handle(req, state.clone()));

        async move { Ok::<_, Infallible>(service) }
    });

    let addr = SocketAddr::new(args.host, args.port);

    let server = Server::try_bind(&addr)?.serve(make_service);
    info!("Listening on http://{}", addr);

    server.with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}
