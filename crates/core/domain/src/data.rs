use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

/// UDP 接收到的原始报文。
#[derive(Debug, Clone)]
pub struct Datagram {
    pub remote_addr: SocketAddr,
    pub payload: Vec<u8>,
}

/// 时序数据点（line protocol 中的一行）。
///
/// 字段值在解码阶段已格式化为字符串，序列化时不做任何数值处理。
/// tags 与 fields 均按 key 排序输出，保证同一数据点序列化结果稳定。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataPoint {
    pub name: String,
    pub bucket: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
    /// Unix 时间戳（秒）。
    pub timestamp: i64,
}

impl DataPoint {
    /// 空数据点：无 tag、无 field、时间戳为 0。
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否满足转发条件：时间戳非 0 且至少有一个 field。
    pub fn is_deliverable(&self) -> bool {
        self.timestamp != 0 && !self.fields.is_empty()
    }

    /// 序列化为 `name,tag=v field1=v1,field2=v2 timestamp`。
    pub fn marshal(&self) -> String {
        let mut line = String::with_capacity(64 + self.fields.len() * 24);
        line.push_str(&self.name);
        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line.push(' ');
        let mut first = true;
        for (key, value) in &self.fields {
            if !first {
                line.push(',');
            }
            first = false;
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line.push(' ');
        line.push_str(&self.timestamp.to_string());
        line
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.marshal())
    }
}
