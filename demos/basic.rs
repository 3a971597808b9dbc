//! runway demo: JSON endpoints, a mounted API, CORS, and error handling,
//! served by hyper with graceful shutdown.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/users/42
//!   curl -X POST http://localhost:3000/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/notes -H 'content-type: text/plain' -d 'remember'
//!   curl -H 'accept: text/plain' http://localhost:3000/api/secret
//!   curl -i -X OPTIONS http://localhost:3000/api/users \
//!        -H 'origin: http://localhost:5173' -H 'access-control-request-method: POST'
//!   curl http://localhost:3000/healthz

use std::net::SocketAddr;

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use runway::middleware::{Cors, ErrorHandler, Origin, body_parser, text};
use runway::{
    BodyParserOptions, Chain, Context, Error, HttpError, Method, Next, ParserOptions, Response,
    Router, StatusCode,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let api = Router::new()
        .get("/users/:id", get_user)
        .post("/users", create_user)
        .delete("/users/:id", delete_user)
        .get("/secret", secret);

    let notes = Chain::new(body_parser(
        BodyParserOptions::new().text(ParserOptions::new().enabled(true)),
    ))
    .then(create_note);

    let app = Router::new()
        .middleware(ErrorHandler::new().logger(|err, ctx| {
            warn!(method = %ctx.req.method(), path = ctx.req.path(), "request failed: {err}");
        }))
        .middleware(
            Cors::new()
                .origin(Origin::predicate(|origin, _| {
                    origin.starts_with("http://localhost").then(|| origin.to_owned())
                }))
                .credentials(true),
        )
        .middleware(timing)
        .mount("/api", api)
        .route(Method::POST, "/notes", notes)
        .route(
            Method::POST,
            "/csv",
            Chain::new(text(ParserOptions::new().type_matcher("text/csv"))).then(echo_csv),
        )
        .get("/healthz", healthz);

    serve("0.0.0.0:3000".parse()?, app).await
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn timing(ctx: &mut Context, next: Next<'_>) -> Result<(), Error> {
    let started = std::time::Instant::now();
    next.run(ctx).await?;
    let elapsed = format!("{}us", started.elapsed().as_micros());
    ctx.req.annotate("x-response-time", &elapsed);
    Ok(())
}

async fn get_user(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
    let id = ctx.req.param("id").unwrap_or("unknown").to_owned();
    ctx.res.json(&serde_json::json!({ "id": id, "name": "alice" }))
}

async fn create_user(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
    let name = ctx.req.body()
        .and_then(|b| b.get("name"))
        .and_then(|n| n.as_str())
        .ok_or_else(|| HttpError::new(422, "`name` is required"))?
        .to_owned();
    ctx.res.header("location", "/api/users/99");
    ctx.res.created(&serde_json::json!({ "id": "99", "name": name }))
}

async fn delete_user(ctx: &mut Context, _next: Next<'_>) -> Response {
    ctx.res.no_content()
}

async fn secret(_ctx: &mut Context, _next: Next<'_>) -> Result<(), HttpError> {
    Err(HttpError::new(401, "Missing token").header("www-authenticate", "Bearer"))
}

async fn create_note(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
    let note = ctx.req.body().cloned().unwrap_or_default();
    ctx.res.status(StatusCode::CREATED).json(&serde_json::json!({ "note": note }))
}

async fn echo_csv(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
    let rows = ctx.req.body().and_then(|b| b.as_str()).map(|s| s.lines().count()).unwrap_or(0);
    ctx.res.json(&serde_json::json!({ "rows": rows }))
}

async fn healthz(_ctx: &mut Context, _next: Next<'_>) -> &'static str {
    "ok"
}

// ── Serving ───────────────────────────────────────────────────────────────────

/// Accepts connections until SIGTERM or Ctrl-C, then drains in-flight ones.
async fn serve(addr: SocketAddr, app: Router) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    let service = app.into_service();

    info!(%addr, "runway demo listening");

    let mut tasks = tokio::task::JoinSet::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Stop accepting as soon as the signal arrives, even with a backlog.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let service = service.clone();
                tasks.spawn(async move {
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        error!(%peer, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("runway demo stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
