//! 测试用的脚本化传输层

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::http_client::{HttpClientError, Transport};
use crate::types::{DetailPath, SourceDescriptor};

#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub result: Result<String, HttpClientError>,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(body.into()),
        }
    }

    pub fn err(e: HttpClientError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(e),
        }
    }

    /// 永不返回，由调用方的超时截断
    pub fn hang() -> Self {
        Self {
            delay: Duration::from_secs(3600),
            result: Ok(String::new()),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// 按 URL 精确匹配回放；队列只剩一项时重复使用该项，未登记的 URL 返回 404
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, url: impl Into<String>, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Reply::err(HttpClientError::BadStatus(404)),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, HttpClientError> {
        self.calls.lock().unwrap().push(url.to_string());
        let reply = self.next_reply(url);

        if reply.delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(HttpClientError::Timeout);
        }
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

pub fn source(id: &str, name: &str) -> SourceDescriptor {
    SourceDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        base_url: format!("https://{}.example.com", id),
        is_adult: false,
        detail_base_url: None,
        detail_path: DetailPath::Provide,
    }
}

pub fn record(id: &str, name: &str, type_name: &str) -> Value {
    json!({
        "vod_id": id,
        "vod_name": name,
        "type_name": type_name,
        "vod_year": "2002",
        "vod_remarks": "HD",
        "vod_pic": "https://img.example.com/p.jpg",
        "vod_play_url": "正片$https://v.example.com/1.m3u8"
    })
}

pub fn page_body(records: Vec<Value>, page_count: u32) -> String {
    json!({ "code": 1, "pagecount": page_count, "list": records }).to_string()
}
