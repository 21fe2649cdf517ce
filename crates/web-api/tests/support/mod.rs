#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{ConnectionRegistry, InMemoryStore, SystemClock};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use domain::{Discussion, DiscussionId, Reply, ReplyId, User, UserEmail, UserId, UserRole};
use infrastructure::Gateways;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tower::ServiceExt;
use web_api::{router, AppState, JwtConfig, JwtService};

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let jwt_service = Arc::new(JwtService::new(JwtConfig {
            secret: "test-secret-key-that-is-long-enough-for-hs256".to_string(),
            expiration_hours: 1,
        }));
        let state = AppState::new(
            Gateways::in_memory(store.clone()),
            Arc::new(ConnectionRegistry::new()),
            jwt_service,
            Arc::new(SystemClock),
            16,
        );
        Self { store, state }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub fn token(&self, user: &User) -> String {
        self.state.jwt_service.generate_token(user.id).unwrap()
    }

    pub async fn user(&self, name: &str) -> User {
        self.user_with_role(name, UserRole::Member).await
    }

    pub async fn user_with_role(&self, name: &str, role: UserRole) -> User {
        let user = User::new(
            UserId::generate(),
            UserEmail::parse(format!("{}@bluezone.test", name.to_lowercase())).unwrap(),
            name,
            role,
            OffsetDateTime::now_utc(),
        );
        self.store.insert_user(user.clone()).await;
        user
    }

    pub async fn discussion(&self, author: &User, title: &str) -> Discussion {
        let discussion = Discussion {
            id: DiscussionId::generate(),
            author_id: author.id,
            title: title.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.store.insert_discussion(discussion.clone()).await;
        discussion
    }

    pub async fn reply(&self, discussion: &Discussion, author: &User, content: &str) -> Reply {
        let reply = Reply {
            id: ReplyId::generate(),
            discussion_id: discussion.id,
            author_id: author.id,
            content: content.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.store.insert_reply(reply.clone()).await;
        reply
    }

    /// 以某个用户身份发一个请求，返回状态码和 JSON 响应体
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        as_user: Option<&User>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = as_user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// 在随机端口上启动真实服务
    pub async fn spawn_server(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self.router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        addr
    }

    /// 等待注册表中的在线状态满足预期
    pub async fn wait_online(&self, user: &User, online: bool) {
        for _ in 0..100 {
            if self.state.registry.is_online(user.id) == online {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("user {} never became online={online}", user.name);
    }
}
