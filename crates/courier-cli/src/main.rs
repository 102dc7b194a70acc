use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use courier_core::domain::{BodyShape, RequestTemplate, TransportError};
use courier_core::impls::{ChannelEventSource, InMemorySink, ScriptedResponse, ScriptedTransport};
use courier_core::ports::{Entity, MutationSink};
use courier_core::{
    Command, CommitContext, CourierBuilder, CourierConfig, Descriptor, DispatchOptions,
    DomainEvent, EventHandler, HandlerError, ResourceKey,
};

#[derive(Debug, Serialize, Deserialize)]
struct RenameTask {
    id: u64,
    title: String,
}

impl Command for RenameTask {
    const TYPE: &'static str = "task.rename";
}

struct RenameTaskDescriptor;

impl Descriptor<RenameTask> for RenameTaskDescriptor {
    /// Key plus what was there before (None: the task did not exist locally).
    type Snapshot = (String, Option<Entity>);

    fn validate(&self, payload: &RenameTask) -> bool {
        !payload.title.trim().is_empty()
    }

    fn resource_keys(&self, payload: &RenameTask) -> Vec<ResourceKey> {
        vec![ResourceKey::entity("task", payload.id)]
    }

    fn request(&self) -> RequestTemplate {
        RequestTemplate::patch("/tasks/{id}").with_body(BodyShape::Fields(vec!["title".into()]))
    }

    fn optimistic_apply(
        &self,
        payload: &RenameTask,
        sink: &dyn MutationSink,
    ) -> Option<Self::Snapshot> {
        let key = task_key(payload.id);
        let previous = sink.get(&key);
        sink.upsert(Entity::new(
            key.clone(),
            json!({"id": payload.id, "title": payload.title, "saving": true}),
        ));
        Some((key, previous))
    }

    fn optimistic_rollback(&self, (key, previous): Self::Snapshot, sink: &dyn MutationSink) {
        match previous {
            Some(entity) => sink.upsert(entity),
            None => sink.remove(&key),
        }
    }

    fn commit(
        &self,
        result: &Value,
        payload: &RenameTask,
        _context: &CommitContext,
        sink: &dyn MutationSink,
    ) {
        let mut body = result.clone();
        body["id"] = json!(payload.id);
        sink.upsert(Entity::new(task_key(payload.id), body));
    }
}

fn task_key(id: u64) -> String {
    format!("task:{id}")
}

/// 他のクライアントが起こした変更を view に反映する handler
struct TaskRenamedHandler;

#[async_trait]
impl EventHandler for TaskRenamedHandler {
    async fn handle(
        &self,
        event: &DomainEvent,
        sink: &dyn MutationSink,
    ) -> Result<(), HandlerError> {
        let title = event
            .payload
            .get("title")
            .ok_or_else(|| HandlerError::new("task.renamed without title"))?;
        sink.upsert(Entity::new(
            format!("task:{}", event.aggregate_id),
            json!({"id": event.aggregate_id, "title": title}),
        ));
        println!("applied remote rename of task {}", event.aggregate_id);
        Ok(())
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier_core=debug")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // (A) 設定（引数があれば JSON ファイルから）
    let config = match std::env::args().nth(1) {
        Some(path) => CourierConfig::from_json_file(path)?,
        None => CourierConfig::default(),
    };

    // (B) サーバーの代わりに台本付き transport を用意
    //     task 1: 1 回目は 503、2 回目で成功 / task 2: 422 で拒否
    let transport = Arc::new(ScriptedTransport::echo_after(Duration::from_millis(150)));
    transport
        .push(
            "/tasks/1",
            ScriptedResponse::err(TransportError::Server {
                status: 503,
                message: "unavailable".into(),
            })
            .after(Duration::from_millis(50)),
        )
        .push(
            "/tasks/2",
            ScriptedResponse::err(TransportError::Server {
                status: 422,
                message: "task is archived".into(),
            }),
        );

    let sink = Arc::new(InMemorySink::with_entities([
        Entity::new("task:1", json!({"id": 1, "title": "draft"})),
        Entity::new("task:2", json!({"id": 2, "title": "groceries"})),
    ]));

    let courier = Arc::new(
        CourierBuilder::new()
            .register::<RenameTask, _>(RenameTaskDescriptor)?
            .expect_instructions(&[RenameTask::TYPE])
            .config(config)
            .transport(transport.clone())
            .sink(sink.clone())
            .build()?,
    );
    courier.on("task.renamed", Arc::new(TaskRenamedHandler));

    // (C) event feed と sweep を起動
    let (source, feed) = ChannelEventSource::new();
    let background = courier.spawn_background(Arc::new(source));

    // (D) dispatch（task 1 への 2 件は直列化、task 2 は並行）
    let jobs = [(1, "write report", 0), (1, "write final report", 5), (2, "buy milk", 0)];
    let mut handles = Vec::new();
    for (id, title, priority) in jobs {
        let courier = Arc::clone(&courier);
        handles.push(tokio::spawn(async move {
            let payload = RenameTask {
                id,
                title: title.to_string(),
            };
            courier
                .dispatch(payload, DispatchOptions::new().priority(priority))
                .await
        }));
    }

    let mut receipts = Vec::new();
    for handle in handles {
        match handle.await? {
            Ok(receipt) => {
                println!(
                    "committed: {} {} after {} attempt(s)",
                    receipt.instruction_id, receipt.instruction_type, receipt.attempts
                );
                receipts.push(receipt);
            }
            Err(err) => println!("failed: {err}"),
        }
    }

    // (E) サーバーからの echo（自分の commit）と他クライアントの変更を流す
    for receipt in &receipts {
        let echo = DomainEvent::new(
            receipt.instruction_id.to_string(),
            "task.renamed",
            "1",
            receipt.result.clone(),
        )
        .with_correlation_id(receipt.correlation_id.to_string());
        feed.send(echo);
    }
    feed.send(DomainEvent::new(
        "remote-1",
        "task.renamed",
        "3",
        json!({"title": "from another tab"}),
    ));
    sleep(Duration::from_millis(100)).await;

    // (F) 結果
    println!("stats: {}", serde_json::to_string(&courier.stats())?);
    for (id, entity) in sink.snapshot() {
        println!("{id} => {}", entity.body);
    }

    background.shutdown_and_join().await;
    Ok(())
}
