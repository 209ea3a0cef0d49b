mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use lineaschool_api::types::Role;

#[tokio::test]
async fn admin_login_round_trip() -> Result<()> {
    let server = common::TestServer::spawn(common::config(None)).await?;
    server.db.seed_user("admin", "secret", "Администратор", Role::Admin, Some("+7 900 000 00 00"));
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/admin-login"))
        .json(&json!({"login": "admin", "password": "secret"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["user"]["fullName"], "Администратор");
    assert_eq!(body["user"]["lessons_paid"], 0);

    let res = client
        .post(server.url("/admin-login"))
        .json(&json!({"login": "admin", "password": "wrong"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(server.db.connections(), (2, 2));
    Ok(())
}

#[tokio::test]
async fn game_catalog_and_results() -> Result<()> {
    let server = common::TestServer::spawn(common::config(None)).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/save-game"))
        .json(&json!({"game_type": "speech", "title": "Звуки", "difficulty": "easy", "config": {"rounds": 3}}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let game_id = res.json::<Value>().await?["game_id"].as_i64().unwrap();

    for (score, max_score) in [(8, 10), (6, 10)] {
        let res = client
            .post(server.url("/save-game-result"))
            .json(&json!({"game_id": game_id, "student_id": 5, "score": score, "max_score": max_score}))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let body = reqwest::get(server.url("/get-games?game_type=speech")).await?.json::<Value>().await?;
    assert_eq!(body["count"], 1);
    let game = &body["games"][0];
    assert_eq!(game["id"], game_id);
    assert_eq!(game["plays_count"], 2);
    assert_eq!(game["average_score"], 70.0);
    assert_eq!(game["config"]["rounds"], 3);
    assert!(game["created_at"].is_string());

    let body = reqwest::get(server.url("/get-games?game_type=memory")).await?.json::<Value>().await?;
    assert_eq!(body["count"], 0);
    Ok(())
}

#[tokio::test]
async fn empty_body_counts_as_missing_fields() -> Result<()> {
    let server = common::TestServer::spawn(common::config(None)).await?;
    let res = reqwest::Client::new().post(server.url("/save-game")).send().await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = res.json::<Value>().await?;
    assert_eq!(body["error"], "game_type and title are required");
    assert_eq!(server.db.connections(), (0, 0));
    Ok(())
}
