//! HttpBackend 契约测试：进程内 axum 服务模拟后端路由

#[cfg(test)]
mod tests {
    use axum::{
        extract::Path,
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use chronicle::api::{AuthRequest, GameBackend, HttpBackend};
    use chronicle::narrator::{Speaker, SubmitKeyRequest};
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn levels() -> Json<Value> {
        Json(json!([
            {"id": 11, "level_number": 2, "title": "The Nile River", "description": "River"},
            {"id": 10, "level_number": 1, "title": "The Pyramids of Giza"}
        ]))
    }

    async fn dialogue(Path(id): Path<i64>) -> Response {
        if id != 10 {
            return (StatusCode::NOT_FOUND, Json(json!({"detail": "Level not found"})))
                .into_response();
        }
        Json(json!([
            {"speaker": "npc", "text": "Speak your purpose.", "character_name": "Sphinx Guardian",
             "character_title": "Riddle Keeper of Giza"},
            {"speaker": "player", "text": "I need the first key."},
            {"speaker": "npc", "text": "It is the key word.", "gives_key": true}
        ]))
        .into_response()
    }

    async fn submit_key(Path(id): Path<i64>, Json(body): Json<Value>) -> Response {
        if body["user_id"] != json!(7) {
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": [{"msg": "bad user"}]})))
                .into_response();
        }
        if id == 10 && body["key"] == json!("HUMAN") {
            Json(json!({"correct": true, "new_credits": 25, "reward_credits_awarded": 25, "next_level_id": 11}))
                .into_response()
        } else {
            Json(json!({"correct": false, "message": "Incorrect key"})).into_response()
        }
    }

    async fn progress(Path(id): Path<i64>) -> Response {
        match id {
            7 => Json(json!({
                "levels": [{"id": 10, "completed": true}, {"id": 11, "completed": false}],
                "next_unlocked_level_number": 2
            }))
            .into_response(),
            8 => (StatusCode::OK, "not json").into_response(),
            _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }

    async fn login(Json(body): Json<Value>) -> Response {
        if body["username"] == json!("ra") {
            Json(json!({"id": 7, "credits": 40})).into_response()
        } else {
            (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Invalid credentials"}))).into_response()
        }
    }

    async fn register() -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
    }

    async fn serve() -> HttpBackend {
        let app = Router::new()
            .route("/levels", get(levels))
            .route("/levels/:id/dialogue", get(dialogue))
            .route("/levels/:id/submit-key", post(submit_key))
            .route("/users/:id/progress", get(progress))
            .route("/login", post(login))
            .route("/register", post(register));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        HttpBackend::new(format!("http://{}/", addr), 5).unwrap()
    }

    #[tokio::test]
    async fn test_levels_and_dialogue() {
        let backend = serve().await;
        let levels = backend.list_levels().await.unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[1].description, "");

        let lines = backend.get_dialogue(10).await.unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].speaker, Speaker::Player);
        assert!(lines[2].gives_key);

        let err = backend.get_dialogue(99).await.unwrap_err();
        assert_eq!(err.kind(), "request");
        assert_eq!(err.user_message(), "Level not found");
    }

    #[tokio::test]
    async fn test_submit_key_contract() {
        let backend = serve().await;
        let ok = backend
            .submit_key(10, &SubmitKeyRequest { user_id: 7, key: "HUMAN".into() })
            .await
            .unwrap();
        assert!(ok.correct);
        assert_eq!(ok.next_level_id, Some(11));

        let wrong = backend
            .submit_key(10, &SubmitKeyRequest { user_id: 7, key: "NILE".into() })
            .await
            .unwrap();
        assert!(!wrong.correct);
        assert_eq!(wrong.message.as_deref(), Some("Incorrect key"));

        // detail 不是字符串时按 JSON 文本展示
        let err = backend
            .submit_key(10, &SubmitKeyRequest { user_id: 1, key: "HUMAN".into() })
            .await
            .unwrap_err();
        assert!(err.user_message().contains("bad user"));
    }

    #[tokio::test]
    async fn test_progress_and_fallback_messages() {
        let backend = serve().await;
        let progress = backend.get_progress(7).await.unwrap();
        assert_eq!(progress.next_unlocked_level_number, Some(2));
        assert!(progress.completed_ids().contains(&10));

        let err = backend.get_progress(9).await.unwrap_err();
        assert_eq!(err.user_message(), "Failed to load progress");

        let err = backend.get_progress(8).await.unwrap_err();
        assert_eq!(err.kind(), "request");
    }

    #[tokio::test]
    async fn test_configured_timeout_applies() {
        let app = Router::new().route(
            "/levels",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!([]))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let backend = HttpBackend::new(format!("http://{}", addr), 1).unwrap();
        let err = backend.list_levels().await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn test_login_and_register() {
        let backend = serve().await;
        let ok = backend
            .login(&AuthRequest { email: "ra@example.com".into(), username: "ra".into() })
            .await
            .unwrap();
        assert_eq!(ok.id, 7);
        assert_eq!(ok.credits, 40);

        let err = backend
            .login(&AuthRequest { email: "x@example.com".into(), username: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Invalid credentials");

        let err = backend
            .register(&AuthRequest { email: "x@example.com".into(), username: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Failed to register");
    }
}
