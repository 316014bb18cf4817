use harbor_core::{Channel, RouteError};
use rand::Rng;

use super::directory::DirectorySnapshot;

/// 权重平滑系数，零权重渠道也能分到少量流量
const SMOOTHING_FACTOR: u64 = 10;

/// 在候选渠道里按优先级与权重随机选取
///
/// `retry` 决定目标优先级档位：0 取最高档，每多一次重试降一档，
/// 超出档位数时取最低档。同档内按 `权重 + 平滑系数` 做加权随机。
/// 对给定快照是纯函数，随机源由调用方注入。
pub fn select_channel<R: Rng + ?Sized>(
    snapshot: &DirectorySnapshot,
    candidates: &[i32],
    retry: usize,
    rng: &mut R,
) -> Result<Channel, RouteError> {
    if candidates.is_empty() {
        return Err(RouteError::EmptyCandidates);
    }

    // 唯一候选直接返回，省掉档位和权重计算
    if let [only] = candidates {
        return snapshot.require_channel(*only).cloned();
    }

    // 收集出现过的优先级并从高到低排序
    let mut priorities: Vec<i64> = Vec::new();
    for &id in candidates {
        let priority = snapshot.require_channel(id)?.priority;
        if !priorities.contains(&priority) {
            priorities.push(priority);
        }
    }
    priorities.sort_unstable_by(|a, b| b.cmp(a));

    // 重试次数钳制在档位范围内
    let tier = retry.min(priorities.len() - 1);
    let target_priority = priorities[tier];

    let mut tier_channels: Vec<&Channel> = Vec::new();
    for &id in candidates {
        let channel = snapshot.require_channel(id)?;
        if channel.priority == target_priority {
            tier_channels.push(channel);
        }
    }

    let total_weight: u64 = tier_channels
        .iter()
        .map(|channel| u64::from(channel.weight) + SMOOTHING_FACTOR)
        .sum();
    let mut random_weight = rng.random_range(0..total_weight) as i64;

    for channel in &tier_channels {
        random_weight -= i64::from(channel.weight) + SMOOTHING_FACTOR as i64;
        if random_weight < 0 {
            return Ok((*channel).clone());
        }
    }

    // 权重走完必然已命中，兜底返回档内第一个
    Ok(tier_channels[0].clone())
}
