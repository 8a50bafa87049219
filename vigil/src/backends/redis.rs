use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use redis::{AsyncCommands, FromRedisValue, RedisWrite, ToRedisArgs};
use tracing::{instrument, trace};

use crate::{
    jobs::{JobDefinition, JobId, JobRun},
    Result,
};

lazy_static! {
    // KEYS[1] schedule zset, KEYS[2] jobs hash; ARGV[1] now millis, ARGV[2] limit
    static ref SCRIPT_PULL_DUE: redis::Script = redis::Script::new(
        r#"
        local ids = redis.call("zrangebyscore", KEYS[1], "-inf", ARGV[1], "LIMIT", 0, ARGV[2])
        local jobs = {}
        for _, id in ipairs(ids) do
            redis.call("zrem", KEYS[1], id)
            local job = redis.call("hget", KEYS[2], id)
            redis.call("hdel", KEYS[2], id)
            if job then
                table.insert(jobs, job)
            end
        end
        return jobs
        "#
    );
}

#[derive(Debug, Clone)]
pub struct Store {
    redis_client: redis::Client,
    namespace: String,
}

fn from_json_value<T: serde::de::DeserializeOwned>(v: &redis::Value) -> redis::RedisResult<T> {
    let bytes = <Vec<u8> as FromRedisValue>::from_redis_value(v)?;
    serde_json::from_slice::<T>(&bytes).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "job json failed",
            e.to_string(),
        ))
    })
}

impl FromRedisValue for JobDefinition {
    fn from_redis_value(v: &redis::Value) -> redis::RedisResult<Self> {
        from_json_value(v)
    }
}

impl FromRedisValue for JobRun {
    fn from_redis_value(v: &redis::Value) -> redis::RedisResult<Self> {
        from_json_value(v)
    }
}

impl ToRedisArgs for JobId {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.as_str().as_bytes());
    }
}

impl Store {
    pub fn new(redis_url: &str) -> Result<Self> {
        Self::with_namespace(redis_url, "vigil")
    }

    pub fn with_namespace(redis_url: &str, namespace: impl Into<String>) -> Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self {
            redis_client,
            namespace: namespace.into(),
        })
    }

    fn jobs_key(&self) -> String {
        format!("{}:jobs", self.namespace)
    }

    fn schedule_key(&self) -> String {
        format!("{}:schedule", self.namespace)
    }

    fn runs_key(&self) -> String {
        format!("{}:runs", self.namespace)
    }
}

#[async_trait::async_trait]
impl super::JobStore for Store {
    #[instrument(skip(self, job_def), fields(job_id = %job_def.id))]
    async fn upsert(&self, job_def: &JobDefinition) -> Result<()> {
        let mut connection = self.redis_client.get_async_connection().await?;
        let body = serde_json::to_vec(job_def)?;
        let () = redis::pipe()
            .atomic()
            .hset(self.jobs_key(), &job_def.id, body)
            .ignore()
            .zadd(
                self.schedule_key(),
                &job_def.id,
                job_def.run_date.timestamp_millis(),
            )
            .ignore()
            .query_async(&mut connection)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn pull_due(
        &self,
        now: DateTime<Utc>,
        count: NonZeroUsize,
    ) -> Result<Vec<JobDefinition>> {
        let mut connection = self.redis_client.get_async_connection().await?;
        let jobs = SCRIPT_PULL_DUE
            .key(self.schedule_key())
            .key(self.jobs_key())
            .arg(now.timestamp_millis())
            .arg(count.get())
            .invoke_async::<_, Vec<JobDefinition>>(&mut connection)
            .await?;
        let count = jobs.len();
        trace!("pulled {} job{}", count, if count == 1 { "" } else { "s" });
        Ok(jobs)
    }

    async fn record_run(&self, run: &JobRun) -> Result<()> {
        let mut connection = self.redis_client.get_async_connection().await?;
        let () = connection
            .hset(self.runs_key(), &run.job_id, serde_json::to_vec(run)?)
            .await?;
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<JobDefinition>> {
        let mut connection = self.redis_client.get_async_connection().await?;
        Ok(connection.hget(self.jobs_key(), id).await?)
    }

    async fn pending(&self) -> Result<Vec<JobDefinition>> {
        let mut connection = self.redis_client.get_async_connection().await?;
        let mut jobs: Vec<JobDefinition> = connection.hvals(self.jobs_key()).await?;
        jobs.sort_by_key(|job| job.run_date);
        Ok(jobs)
    }

    async fn last_run(&self, id: &JobId) -> Result<Option<JobRun>> {
        let mut connection = self.redis_client.get_async_connection().await?;
        Ok(connection.hget(self.runs_key(), id).await?)
    }
}
