use hcp_core::{EmployeeRecord, Regional};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU32, Ordering};
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}

/// Queue name no other test in this process will use.
pub fn unique_queue(prefix: &str) -> String {
    unique_id(&format!("test-{prefix}"))
}

pub struct RedisFixture {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    url: String
}

impl RedisFixture {
    pub fn url(&self) -> &str {
        &self.url
    }
}

static REDIS: OnceCell<Option<RedisFixture>> = OnceCell::const_new();

pub async fn redis() -> Option<&'static RedisFixture> {
    REDIS
        .get_or_init(|| async {
            match Redis::default().start().await {
                Ok(container) => {
                    let port = match container.get_host_port_ipv4(6379).await {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!("Failed to get Redis port: {:?}", e);
                            return None;
                        }
                    };
                    let url = format!("redis://localhost:{}", port);

                    if let Err(e) = verify_redis_connection(&url).await {
                        tracing::warn!("Redis connection verification failed: {:?}", e);
                        return None;
                    }

                    tracing::info!("Redis fixture started on port {}", port);
                    Some(RedisFixture { container, url })
                }
                Err(e) => {
                    tracing::warn!("Failed to start Redis container: {:?}", e);
                    None
                }
            }
        })
        .await
        .as_ref()
}

async fn verify_redis_connection(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = redis::Client::open(url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}

/// The record used throughout the pipeline scenarios.
pub fn jane() -> EmployeeRecord {
    let mut record = EmployeeRecord::new("Jane", "123");
    record.kib_number = Some("K1".to_string());
    record.regionals = vec![Regional::new("zona-i")];
    record
}

pub fn jane_json() -> Value {
    json!({
        "name": "Jane",
        "identity_number": "123",
        "kib_number": "K1",
        "regionals": [{"slug": "zona-i"}]
    })
}

/// An HR page body as the listing endpoint returns it.
pub fn hr_page(current_page: u32, last_page: u32, records: Vec<Value>) -> Value {
    let total = records.len();
    json!({
        "data": records,
        "pagination": {
            "current_page": current_page,
            "last_page": last_page,
            "total": total
        }
    })
}

/// Minimal HR record with a name derived from `n`.
pub fn hr_record(n: u32) -> Value {
    json!({
        "name": format!("Employee {n}"),
        "identity_number": format!("ID-{n:04}"),
        "kib_number": format!("KIB-{n}"),
        "phone_number": "08123456789",
        "email": format!("employee{n}@example.com"),
        "photo": {"link": null},
        "regionals": [{"slug": "zona-ii"}, {"slug": "unknown-zone"}]
    })
}
