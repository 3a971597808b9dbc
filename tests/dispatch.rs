mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{get, json_of, post, send};
use runway::{
    Chain, Context, Error, HttpError, Method, Next, Response, Router, StatusCode, from_fn,
};
use serde_json::json;

async fn user(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
    let id = ctx.req.param("id").unwrap_or_default().to_owned();
    ctx.res.json(&json!({ "id": id }))
}

async fn echo(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
    let body = ctx.req.body().cloned();
    ctx.res.json(&json!({ "body": body }))
}

#[tokio::test]
async fn path_params_reach_the_handler() {
    let app = Router::new().get("/users/:id", user);
    let res = send(&app, get("/users/42")).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json_of(&res), json!({ "id": "42" }));
}

#[tokio::test]
async fn json_body_is_parsed_before_the_handler() {
    let app = Router::new().post("/echo", echo);
    let res = send(&app, post("/echo", "application/json", r#"{"hello":"world"}"#)).await;

    assert_eq!(json_of(&res), json!({ "body": { "hello": "world" } }));
}

#[tokio::test]
async fn structured_error_keeps_status_and_message() {
    async fn guarded(_ctx: &mut Context, _next: Next<'_>) -> Result<(), HttpError> {
        Err(HttpError::new(401, "Missing token"))
    }

    let app = Router::new().get("/private", guarded);
    let req = http::Request::get("/private")
        .header("accept", "application/json")
        .body(Default::default())
        .unwrap();
    let res = send(&app, req).await;

    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_of(&res), json!({ "error": "Missing token" }));
}

#[tokio::test]
async fn generic_failures_and_panics_become_500() {
    async fn broken(_ctx: &mut Context, _next: Next<'_>) -> Result<(), Error> {
        let n: i32 = "not a number".parse()?;
        let _ = n;
        Ok(())
    }

    async fn panics(_ctx: &mut Context, _next: Next<'_>) {
        panic!("null pointer");
    }

    let app = Router::new().get("/broken", broken).get("/panics", panics);
    for path in ["/broken", "/panics"] {
        let res = send(&app, get(path)).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_of(&res), json!({ "error": "Internal Server Error" }));
    }
}

#[tokio::test]
async fn mounted_router_sees_the_stripped_path() {
    async fn status(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
        let path = ctx.req.path().to_owned();
        ctx.res.header("x-sub", "yes");
        ctx.res.json(&json!({ "path": path }))
    }

    let api = Router::new().get("/status", status).get("/", status);
    let app = Router::new().mount("/api", api);

    let res = send(&app, get("/api/status")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json_of(&res), json!({ "path": "/status" }));
    assert_eq!(res.header("x-sub"), Some("yes"));

    let res = send(&app, get("/api")).await;
    assert_eq!(json_of(&res), json!({ "path": "/" }));
}

#[tokio::test]
async fn unmatched_path_is_404() {
    let app = Router::new().get("/users/:id", user);
    let res = send(&app, get("/missing")).await;

    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(json_of(&res), json!({ "error": "Not Found" }));

    // Method mismatch is a miss too.
    let res = send(&app, post("/users/1", "text/plain", "")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn first_registered_route_wins() {
    async fn first(_ctx: &mut Context, _next: Next<'_>) -> &'static str { "first" }
    async fn second(_ctx: &mut Context, _next: Next<'_>) -> &'static str { "second" }

    let app = Router::new()
        .get("/items/:id", first)
        .get("/items/special", second);
    let res = send(&app, get("/items/special")).await;
    assert_eq!(res.body().as_ref(), b"first");
}

#[tokio::test]
async fn mounts_take_precedence_over_own_routes_even_on_404() {
    async fn own(_ctx: &mut Context, _next: Next<'_>) -> &'static str { "own" }

    let app = Router::new()
        .get("/api/own", own)
        .mount("/api", Router::new());
    let res = send(&app, get("/api/own")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn prefix_match_is_not_segment_aware() {
    async fn seen(ctx: &mut Context, _next: Next<'_>) -> String {
        ctx.req.path().to_owned()
    }

    let sub = Router::new().get("/key/x", seen);
    let app = Router::new().mount("/api", sub);
    let res = send(&app, get("/apikey/x")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body().as_ref(), b"/key/x");
}

#[tokio::test]
async fn trailing_slash_prefix_delegates_a_rooted_path() {
    async fn seen(ctx: &mut Context, _next: Next<'_>) -> String {
        ctx.req.path().to_owned()
    }

    let app = Router::new().mount("/api/", Router::new().get("/users", seen));
    let res = send(&app, get("/api/users?page=2")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body().as_ref(), b"/users");
}

#[tokio::test]
async fn later_response_replaces_an_earlier_one() {
    async fn early(ctx: &mut Context, next: Next<'_>) -> Result<Response, Error> {
        let response = Response::text("early");
        next.run(ctx).await?;
        Ok(response)
    }

    async fn captured_then_continue(ctx: &mut Context, next: Next<'_>) -> Result<(), Error> {
        next.run(ctx).await
    }

    async fn late(_ctx: &mut Context, _next: Next<'_>) -> &'static str { "late" }

    // `early` returns after `late` finished, so it is the last write.
    let app = Router::new().route(Method::GET, "/", Chain::new(early).then(late));
    let res = send(&app, get("/")).await;
    assert_eq!(res.body().as_ref(), b"early");

    let app = Router::new().route(Method::GET, "/", Chain::new(captured_then_continue).then(late));
    let res = send(&app, get("/")).await;
    assert_eq!(res.body().as_ref(), b"late");
}

#[tokio::test]
async fn handler_that_skips_next_stops_the_chain() {
    let reached = Arc::new(AtomicUsize::new(0));
    let counter = reached.clone();

    async fn gate(ctx: &mut Context, _next: Next<'_>) -> Result<Response, Error> {
        ctx.res.status(StatusCode::FORBIDDEN).json(&json!({ "error": "nope" }))
    }

    let app = Router::new().route(
        Method::GET,
        "/",
        Chain::new(gate).then(from_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(None) })
        })),
    );
    let res = send(&app, get("/")).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn builder_response_is_the_fallback_and_empty_200_the_default() {
    async fn built(ctx: &mut Context, _next: Next<'_>) {
        ctx.res.status(StatusCode::ACCEPTED).text("queued");
    }
    async fn silent(_ctx: &mut Context, _next: Next<'_>) {}

    let app = Router::new().get("/built", built).get("/silent", silent);

    let res = send(&app, get("/built")).await;
    assert_eq!(res.status_code(), StatusCode::ACCEPTED);
    assert_eq!(res.body().as_ref(), b"queued");

    let res = send(&app, get("/silent")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn annotations_land_on_raw_and_error_responses() {
    async fn tag(ctx: &mut Context, next: Next<'_>) -> Result<(), Error> {
        ctx.req.annotate("x-request-id", "abc");
        next.run(ctx).await
    }
    async fn raw(_ctx: &mut Context, _next: Next<'_>) -> Response {
        let mut res = Response::text("raw body");
        *res.headers_mut() = Default::default();
        res
    }
    async fn fails(_ctx: &mut Context, _next: Next<'_>) -> Result<(), HttpError> {
        Err(HttpError::new(409, "Conflict"))
    }

    let app = Router::new().middleware(tag).get("/raw", raw).get("/fails", fails);

    let res = send(&app, get("/raw")).await;
    assert_eq!(res.body().as_ref(), b"raw body");
    assert_eq!(res.header("x-request-id"), Some("abc"));

    let res = send(&app, get("/fails")).await;
    assert_eq!(res.status_code(), StatusCode::CONFLICT);
    assert_eq!(res.header("x-request-id"), Some("abc"));
}

#[tokio::test]
async fn text_clients_get_plain_error_messages() {
    async fn missing(_ctx: &mut Context, _next: Next<'_>) -> Result<(), HttpError> {
        Err(HttpError::new(404, "User not found"))
    }

    let app = Router::new().get("/u", missing);
    let req = http::Request::get("/u")
        .header("accept", "text/plain")
        .body(Default::default())
        .unwrap();
    let res = send(&app, req).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(res.body().as_ref(), b"User not found");
}

#[tokio::test]
async fn query_string_survives_mount_delegation() {
    async fn q(ctx: &mut Context, _next: Next<'_>) -> String {
        ctx.req.query_param("page").unwrap_or_default()
    }

    let app = Router::new().mount("/v1", Router::new().get("/list", q));
    let res = send(&app, get("/v1/list?page=3")).await;
    assert_eq!(res.body().as_ref(), b"3");
}

#[tokio::test]
async fn with_accepts_middleware_and_mounts() {
    async fn mark(ctx: &mut Context, next: Next<'_>) -> Result<(), Error> {
        ctx.req.annotate("x-mark", "1");
        next.run(ctx).await
    }

    let app = Router::new()
        .with(mark)
        .with(("/sub", Router::new().get("/", user)));
    let res = send(&app, get("/sub")).await;
    assert_eq!(res.header("x-mark"), None, "outer middleware does not wrap delegated requests");
    assert_eq!(json_of(&res), json!({ "id": "" }));
}

#[tokio::test]
async fn invalid_error_header_panics_into_a_500() {
    async fn bad(_ctx: &mut Context, _next: Next<'_>) -> Result<(), HttpError> {
        Err(HttpError::new(401, "Missing token").header("bad name", "x"))
    }

    let app = Router::new().get("/bad", bad);
    let res = send(&app, get("/bad")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_of(&res), json!({ "error": "Internal Server Error" }));
}
