//! 连接指纹
//!
//! 根据 `remote_addr` / `remote_port` 请求头推导一个 32 位关联键，
//! 来自同一物理连接的轮询请求大概率得到相同的值。
//! 指纹只是快速分桶用的预过滤，不保证唯一；碰撞由关联器的连接身份比较兜底。

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use rand::RngCore;

use crate::error::{PollError, PollResult};

/// 缺少元数据时使用的随机源
///
/// 显式注入，测试中可以换成固定种子的生成器。
pub trait RandomSource {
    fn next_random(&mut self) -> u32;
}

impl<R: RngCore + ?Sized> RandomSource for R {
    fn next_random(&mut self) -> u32 {
        self.next_u32()
    }
}

/// 32 位连接指纹，构造后不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionFingerprint(i32);

impl ConnectionFingerprint {
    /// 根据地址与端口头计算指纹
    ///
    /// - 地址存在：地址字符串哈希左移 16 位；否则用随机值左移 16 位
    /// - 端口存在：取逗号分隔列表的第一项解析为整数累加；否则累加 16 位随机值
    ///
    /// 端口头存在但无法解析时返回 [`PollError::InvalidPortHeader`]。
    /// 两项都缺失的请求几乎不会彼此关联。
    pub fn compute<R: RandomSource + ?Sized>(
        remote_addr: Option<&str>,
        remote_port: Option<&str>,
        rng: &mut R,
    ) -> PollResult<Self> {
        let high = match remote_addr {
            Some(addr) => address_hash(addr),
            None => (rng.next_random() & 0x7fff_ffff) as i32,
        };
        let mut value = high.wrapping_shl(16);

        match remote_port {
            Some(ports) => value = value.wrapping_add(parse_first_port(ports)?),
            None => value = value.wrapping_add((rng.next_random() & 0xffff) as i32),
        }

        Ok(Self(value))
    }

    /// 直接从已知值构造
    pub const fn from_value(value: i32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for ConnectionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0 as u32)
    }
}

/// 地址字符串的稳定哈希，折叠为 32 位
fn address_hash(addr: &str) -> i32 {
    let mut hasher = DefaultHasher::new();
    addr.hash(&mut hasher);
    let h = hasher.finish();
    (h ^ (h >> 32)) as u32 as i32
}

/// 端口头可能是 `"12345, 8080"` 这样的列表（经过代理时），只取第一项
fn parse_first_port(header: &str) -> PollResult<i32> {
    let first = header.split(',').next().unwrap_or_default().trim();
    first.parse::<i32>().map_err(|source| PollError::InvalidPortHeader {
        value: header.to_string(),
        source,
    })
}
