use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use gleaner_domain::ScrapeTask;
use gleaner_errors::{GleanError, GleanResult};
use metrics::counter;
use redis::aio::ConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::item::{DeadLetter, EnqueueOpts, QueueConfig, QueueItem, QueueStats};

/// 原子出队: 弹出最高分成员并立刻挂上租约
const POP_SCRIPT: &str = r#"
local popped = redis.call('ZPOPMAX', KEYS[1])
if #popped == 0 then
  return false
end
redis.call('ZADD', KEYS[2], ARGV[1], popped[1])
return popped[1]
"#;

/// Redis 持久化工作队列
pub struct ScrapeQueue {
    conn: ConnectionManager,
    name: String,
    config: QueueConfig,
    paused: AtomicBool,
    paused_by_cpu: AtomicBool,
    pop_script: redis::Script,
}

impl ScrapeQueue {
    /// 建立连接并初始化队列。队列是必需依赖，连接失败直接报错。
    pub async fn connect(redis_url: &str, name: &str, config: QueueConfig) -> GleanResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| GleanError::queue_error(format!("invalid redis url: {e}")))?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| GleanError::queue_error(format!("redis connect failed: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| GleanError::queue_error(format!("redis ping failed: {e}")))?;

        info!("队列已连接: {} ({})", name, redis_url);

        Ok(Self {
            conn,
            name: name.to_string(),
            config,
            paused: AtomicBool::new(false),
            paused_by_cpu: AtomicBool::new(false),
            pop_script: redis::Script::new(POP_SCRIPT),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn key(&self, part: &str) -> String {
        format!("gleaner:queue:{}:{}", self.name, part)
    }

    fn item_key(&self, id: &str) -> String {
        self.key(&format!("item:{id}"))
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    async fn load_item(&self, id: &str) -> GleanResult<Option<QueueItem>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.item_key(id))
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store_item(&self, item: &QueueItem) -> GleanResult<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(item)?;
        let _: () = redis::cmd("SET")
            .arg(self.item_key(&item.id))
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// 入队。条目记录与排序成员在一个事务里写入。
    #[instrument(skip(self, task), fields(job_id = task.job_id, url = %task.url))]
    pub async fn enqueue(&self, task: ScrapeTask, opts: EnqueueOpts) -> GleanResult<String> {
        let item = QueueItem::new(task, opts);
        let raw = serde_json::to_string(&item)?;

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.item_key(&item.id))
            .arg(raw)
            .ignore()
            .cmd("ZADD")
            .arg(self.key("waiting"))
            .arg(item.effective_score())
            .arg(&item.id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        counter!("gleaner_queue_enqueued_total").increment(1);
        debug!("入队成功: {}", item.id);
        Ok(item.id)
    }

    /// 取下一个条目并挂上租约; 队列暂停或为空时返回 None
    pub async fn pop_next(&self) -> GleanResult<Option<QueueItem>> {
        if self.is_paused() {
            return Ok(None);
        }

        let lease_deadline = Self::now_ms() + self.config.lease.as_millis() as i64;
        let mut conn = self.conn.clone();

        let popped: Option<String> = self
            .pop_script
            .key(self.key("waiting"))
            .key(self.key("active"))
            .arg(lease_deadline)
            .invoke_async(&mut conn)
            .await?;

        let Some(id) = popped else {
            return Ok(None);
        };

        match self.load_item(&id).await? {
            Some(item) => {
                counter!("gleaner_queue_leased_total").increment(1);
                Ok(Some(item))
            }
            None => {
                // 记录缺失的孤儿成员，丢弃租约
                warn!("队列成员 {} 缺少条目记录，已丢弃", id);
                let _: () = redis::cmd("ZREM")
                    .arg(self.key("active"))
                    .arg(&id)
                    .query_async(&mut conn)
                    .await?;
                Ok(None)
            }
        }
    }

    /// 条目成功完成: 释放租约、删除记录、写入保留列表
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn complete(&self, item: &QueueItem) -> GleanResult<()> {
        let summary = serde_json::to_string(item)?;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZREM")
            .arg(self.key("active"))
            .arg(&item.id)
            .ignore()
            .cmd("DEL")
            .arg(self.item_key(&item.id))
            .ignore()
            .cmd("LPUSH")
            .arg(self.key("completed"))
            .arg(summary)
            .ignore()
            .cmd("LTRIM")
            .arg(self.key("completed"))
            .arg(0)
            .arg(self.config.keep_completed as i64 - 1)
            .ignore()
            .cmd("INCR")
            .arg(self.key("counts:completed"))
            .ignore()
            .query_async(&mut conn)
            .await?;

        counter!("gleaner_queue_completed_total").increment(1);
        Ok(())
    }

    /// 失败后按退避重新投递（attempts 已由调用方累加）
    #[instrument(skip(self, item), fields(item_id = %item.id, attempts = item.attempts))]
    pub async fn retry_later(&self, item: &QueueItem) -> GleanResult<()> {
        let backoff = self.config.backoff_for(item.attempts);
        let ready_at = Self::now_ms() + backoff.as_millis() as i64;
        let raw = serde_json::to_string(item)?;

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.item_key(&item.id))
            .arg(raw)
            .ignore()
            .cmd("ZREM")
            .arg(self.key("active"))
            .arg(&item.id)
            .ignore()
            .cmd("ZADD")
            .arg(self.key("delayed"))
            .arg(ready_at)
            .arg(&item.id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        counter!("gleaner_queue_retried_total").increment(1);
        debug!("条目 {} 将在 {:?} 后重试", item.id, backoff);
        Ok(())
    }

    /// 终态失败: 写入死信记录并结清条目
    #[instrument(skip(self, item, stack), fields(item_id = %item.id))]
    pub async fn fail(&self, item: &QueueItem, error: &str, stack: &str) -> GleanResult<DeadLetter> {
        let dead_letter = DeadLetter::from_item(item, error, stack);
        let raw = serde_json::to_string(&dead_letter)?;

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZREM")
            .arg(self.key("active"))
            .arg(&item.id)
            .ignore()
            .cmd("DEL")
            .arg(self.item_key(&item.id))
            .ignore()
            .cmd("LPUSH")
            .arg(self.key("failed"))
            .arg(raw)
            .ignore()
            .cmd("LTRIM")
            .arg(self.key("failed"))
            .arg(0)
            .arg(self.config.keep_failed as i64 - 1)
            .ignore()
            .cmd("INCR")
            .arg(self.key("counts:failed"))
            .ignore()
            .query_async(&mut conn)
            .await?;

        counter!("gleaner_queue_failed_total").increment(1);
        Ok(dead_letter)
    }

    /// 维护一拍: 提升到期的延迟条目，回收过期租约。
    /// 返回 (重新投递的条目, 因反复 stalled 被强制失败的条目)。
    pub async fn maintenance(&self) -> GleanResult<(Vec<QueueItem>, Vec<QueueItem>)> {
        let now = Self::now_ms();
        let mut conn = self.conn.clone();

        // 到期的延迟条目回到等待集合
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.key("delayed"))
            .arg("-inf")
            .arg(now)
            .query_async(&mut conn)
            .await?;

        for id in due {
            let Some(item) = self.load_item(&id).await? else {
                let _: () = redis::cmd("ZREM")
                    .arg(self.key("delayed"))
                    .arg(&id)
                    .query_async(&mut conn)
                    .await?;
                continue;
            };
            // 先抢占移除，并发的维护循环不会重复投递
            let removed: i64 = redis::cmd("ZREM")
                .arg(self.key("delayed"))
                .arg(&id)
                .query_async(&mut conn)
                .await?;
            if removed > 0 {
                let _: () = redis::cmd("ZADD")
                    .arg(self.key("waiting"))
                    .arg(item.effective_score())
                    .arg(&id)
                    .query_async(&mut conn)
                    .await?;
            }
        }

        // 租约过期的执行中条目
        let lapsed: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.key("active"))
            .arg("-inf")
            .arg(now)
            .query_async(&mut conn)
            .await?;

        let mut stalled = Vec::new();
        let mut dead = Vec::new();

        for id in lapsed {
            let removed: i64 = redis::cmd("ZREM")
                .arg(self.key("active"))
                .arg(&id)
                .query_async(&mut conn)
                .await?;
            if removed == 0 {
                continue;
            }
            let Some(mut item) = self.load_item(&id).await? else {
                continue;
            };

            item.stalled += 1;
            counter!("gleaner_queue_stalled_total").increment(1);

            if item.stalled > self.config.max_stalled {
                warn!(
                    "条目 {} stalled {} 次，强制失败",
                    item.id, item.stalled
                );
                self.fail(&item, "lease expired repeatedly", "lease expired repeatedly")
                    .await?;
                dead.push(item);
            } else {
                self.store_item(&item).await?;
                let _: () = redis::cmd("ZADD")
                    .arg(self.key("waiting"))
                    .arg(item.effective_score())
                    .arg(&item.id)
                    .query_async(&mut conn)
                    .await?;
                stalled.push(item);
            }
        }

        Ok((stalled, dead))
    }

    pub async fn stats(&self) -> GleanResult<QueueStats> {
        let mut conn = self.conn.clone();
        let (waiting, delayed, active, completed, failed): (i64, i64, i64, Option<i64>, Option<i64>) =
            redis::pipe()
                .cmd("ZCARD")
                .arg(self.key("waiting"))
                .cmd("ZCARD")
                .arg(self.key("delayed"))
                .cmd("ZCARD")
                .arg(self.key("active"))
                .cmd("GET")
                .arg(self.key("counts:completed"))
                .cmd("GET")
                .arg(self.key("counts:failed"))
                .query_async(&mut conn)
                .await?;

        Ok(QueueStats {
            waiting: waiting + delayed,
            active,
            completed: completed.unwrap_or(0),
            failed: failed.unwrap_or(0),
            is_paused: self.is_paused(),
            paused_by_cpu: self.paused_by_cpu(),
        })
    }

    /// 暂停取件; 执行中的条目继续跑完
    pub fn pause(&self, by_cpu: bool) {
        if by_cpu && self.paused.load(Ordering::SeqCst) {
            // 不覆盖手动暂停
            return;
        }
        self.paused.store(true, Ordering::SeqCst);
        self.paused_by_cpu.store(by_cpu, Ordering::SeqCst);
        info!("队列已暂停 (by_cpu={})", by_cpu);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.paused_by_cpu.store(false, Ordering::SeqCst);
        info!("队列已恢复");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn paused_by_cpu(&self) -> bool {
        self.paused_by_cpu.load(Ordering::SeqCst)
    }

    pub async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|pong| pong == "PONG")
            .unwrap_or(false)
    }
}
