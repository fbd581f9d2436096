//! A small users API demonstrating routing, middleware and deferred replies.
//!
//! Run with `cargo run --example users_api`, then for example:
//!
//! ```text
//! curl -X POST localhost:8080/users -H 'Content-Type: application/json' \
//!      -d '{"username":"bob","password":"x","tags":["admin"]}'
//! curl localhost:8080/users/bob
//! curl localhost:8080/users/bob/feed?limit=2
//! curl -H 'Authorization: Bearer demo' localhost:8080/admin/stats
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use microhttp_rs::{Cors, HttpResponse, HttpServer, Router, ServerConfig, StatusCode};

#[derive(Debug, Clone, Deserialize)]
struct NewUser {
    username: String,
    password: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct User {
    username: String,
    tags: Vec<String>,
}

type Store = Arc<Mutex<HashMap<String, User>>>;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let store: Store = Arc::new(Mutex::new(HashMap::new()));
    let mut router = Router::new();

    router.use_middleware(Cors::permissive());

    // Everything under /admin needs a bearer token.
    router.use_fn_at("/admin", |req, _params, reply, next| match req.get_header("Authorization") {
        Some(value) if value.starts_with("Bearer ") => next.run(reply),
        _ => reply.respond(HttpResponse::text(StatusCode::Unauthorized, "Missing bearer token")),
    });

    let users = Arc::clone(&store);
    router.post("/users", move |req, _params, reply| {
        let new_user: NewUser = match req.json() {
            Ok(user) => user,
            Err(e) => {
                return reply.respond(HttpResponse::text(StatusCode::BadRequest, e.to_string()));
            }
        };
        if new_user.password.is_empty() {
            return reply.respond(HttpResponse::text(StatusCode::BadRequest, "Password must not be empty"));
        }

        let user = User {
            username: new_user.username,
            tags: new_user.tags,
        };
        let mut users = match users.lock() {
            Ok(users) => users,
            Err(e) => return reply.fail(e),
        };
        users.insert(user.username.clone(), user.clone());
        reply.send(HttpResponse::json(StatusCode::Created, &user));
    });

    let users = Arc::clone(&store);
    router.get("/users/:username", move |_req, params, reply| {
        let username = params.get("username").unwrap_or_default();
        let found = match users.lock() {
            Ok(users) => users.get(username).cloned(),
            Err(e) => return reply.fail(e),
        };
        match found {
            Some(user) => reply.send(HttpResponse::json(StatusCode::Ok, &user)),
            None => reply.respond(HttpResponse::text(StatusCode::NotFound, format!("No user named {username}"))),
        }
    });

    // The feed is "slow"; the reply is sent from a task once it is ready.
    router.get("/users/:username/feed", |req, params, reply| {
        let username = params.get("username").unwrap_or_default().to_string();
        let limit = req
            .get_query_param("limit")
            .and_then(|limit| limit.parse::<usize>().ok())
            .unwrap_or(10);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let items: Vec<String> = (1..=limit).map(|n| format!("post {n} by {username}")).collect();
            reply.send(HttpResponse::json(StatusCode::Ok, &json!({ "user": username, "items": items })));
        });
    });

    let users = Arc::clone(&store);
    router.delete("/users/:username", move |_req, params, reply| {
        let removed = match users.lock() {
            Ok(mut users) => users.remove(params.get("username").unwrap_or_default()),
            Err(e) => return reply.fail(e),
        };
        match removed {
            Some(_) => reply.respond(HttpResponse::new(StatusCode::NoContent)),
            None => reply.respond(HttpResponse::text(StatusCode::NotFound, "No such user")),
        }
    });

    let users = Arc::clone(&store);
    router.get("/admin/stats", move |_req, _params, reply| {
        let count = match users.lock() {
            Ok(users) => users.len(),
            Err(e) => return reply.fail(e),
        };
        reply.send(HttpResponse::json(StatusCode::Ok, &json!({ "users": count })));
    });

    router.get("/static/*", |_req, params, reply| {
        let file = params.get("*").unwrap_or_default();
        reply.respond(HttpResponse::text(StatusCode::Ok, format!("would serve {file}")));
    });

    let config = ServerConfig::default().with_addr("127.0.0.1:8080".parse()?);
    let server = HttpServer::bind(config, router)?;
    server.start()?;

    Ok(())
}
