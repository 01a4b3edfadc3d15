use async_trait::async_trait;
use bson::oid::ObjectId;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, Script};
use shared::{CreateTodo, Todo, UpdateTodo};

use super::{now, Result, StoreError, TodoStore};

/// Overwrites KEYS[1] with ARGV[2] only while it still holds ARGV[1].
/// Replies 1 when written, 0 when the key is gone, -1 when it changed.
const COMPARE_AND_SET: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
    return 0
end
if current ~= ARGV[1] then
    return -1
end
redis.call('SET', KEYS[1], ARGV[2])
return 1
";

const UPDATE_ATTEMPTS: usize = 8;

#[derive(Debug, PartialEq, Eq)]
enum Swap {
    Written,
    Missing,
    Changed,
}

impl Swap {
    fn from_reply(reply: i64) -> Result<Self> {
        match reply {
            1 => Ok(Swap::Written),
            0 => Ok(Swap::Missing),
            -1 => Ok(Swap::Changed),
            other => Err(StoreError::Write(format!(
                "unexpected compare-and-set reply {other}"
            ))),
        }
    }
}

/// Redis backend. Each todo is a JSON value under `<collection>:<id>` and
/// the set `<collection>` indexes the ids.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    collection: String,
    compare_and_set: Script,
}

impl RedisStore {
    pub async fn connect(url: &str, collection: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            conn,
            collection: collection.to_string(),
            compare_and_set: Script::new(COMPARE_AND_SET),
        })
    }

    fn key(&self, id: &str) -> String {
        item_key(&self.collection, id)
    }

    async fn load(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn swap(&self, key: &str, before: &str, after: &str) -> Result<Swap> {
        let mut conn = self.conn.clone();
        let reply: i64 = self
            .compare_and_set
            .key(key)
            .arg(before)
            .arg(after)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Swap::from_reply(reply)
    }

    async fn insert_new(&self, todo: &Todo) -> Result<()> {
        let value = encode(todo)?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set(self.key(&todo.id), value)
            .ignore()
            .sadd(&self.collection, &todo.id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))
    }
}

fn item_key(collection: &str, id: &str) -> String {
    format!("{collection}:{id}")
}

fn encode(todo: &Todo) -> Result<String> {
    serde_json::to_string(todo).map_err(|e| StoreError::Write(e.to_string()))
}

fn decode(value: &str) -> Result<Todo> {
    serde_json::from_str(value).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl TodoStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Todo>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(&self.collection)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.key(id)).collect();
        let values: Vec<Option<String>> = conn
            .mget(&keys)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        // An id can outlive its value if the key was removed by hand.
        values.iter().flatten().map(|value| decode(value)).collect()
    }

    async fn insert(&self, input: CreateTodo) -> Result<String> {
        let todo = Todo::new(ObjectId::new().to_hex(), input, now());
        self.insert_new(&todo).await?;
        Ok(todo.id)
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Todo>> {
        let value = self.load(&self.key(&id.to_hex())).await?;
        value.as_deref().map(decode).transpose()
    }

    // The write only lands if the value is still the one read, so a delete
    // or another update in between is never overwritten.
    async fn update_by_id(&self, id: ObjectId, changes: UpdateTodo) -> Result<Option<Todo>> {
        let key = self.key(&id.to_hex());
        for _ in 0..UPDATE_ATTEMPTS {
            let Some(before) = self.load(&key).await? else {
                return Ok(None);
            };
            let mut todo = decode(&before)?;
            todo.apply(changes.clone(), now());

            match self.swap(&key, &before, &encode(&todo)?).await? {
                Swap::Written => return Ok(Some(todo)),
                Swap::Missing => return Ok(None),
                Swap::Changed => continue,
            }
        }
        Err(StoreError::Write(format!(
            "todo {id} changed on every one of {UPDATE_ATTEMPTS} update attempts"
        )))
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<bool> {
        let id = id.to_hex();
        let mut conn = self.conn.clone();
        let (deleted, _): (usize, usize) = redis::pipe()
            .atomic()
            .del(self.key(&id))
            .srem(&self.collection, &id)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(deleted > 0)
    }
}
