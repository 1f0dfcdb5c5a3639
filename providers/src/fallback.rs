//! Pre-authored fortunes substituted when live generation is slow or fails.

use std::sync::LazyLock;

use lingqian_types::FortuneRecord;

/// Embedded pool source. Parsed (and thereby validated) once on first use.
const FALLBACK_JSON: &str = r#"[
  {
    "level": "上吉签",
    "title": "乘风破浪",
    "poem": ["长风破浪会有时", "直挂云帆济沧海"],
    "interpretation": "时机已经成熟，现在的阻力只是暂时的。拿出勇气，抓住眼前的机会，大干一场吧。",
    "advice": {
      "career": "大胆推行新计划，会有贵人相助。",
      "love": "主动出击，不要犹豫。",
      "health": "精力充沛，适合运动。",
      "wealth": "投资运佳，看准就下手。"
    }
  },
  {
    "level": "中平签",
    "title": "韬光养晦",
    "poem": ["潜龙勿用久藏修", "待时而动乐无忧"],
    "interpretation": "现在还不是出头的最佳时机。建议保持低调，多积累实力，等待更好的风口。",
    "advice": {
      "career": "守成为上，避免大变动。",
      "love": "顺其自然，不要强求。",
      "health": "注意休息，避免过劳。",
      "wealth": "储蓄为主，不宜冒险。"
    }
  },
  {
    "level": "中吉签",
    "title": "守得云开",
    "poem": ["山重水复疑无路", "柳暗花明又一村"],
    "interpretation": "目前的困难只是暂时的迷雾。坚持下去，很快就会看到转机，好运正在赶来的路上。",
    "advice": {
      "career": "坚持目前的努力，不要轻言放弃。",
      "love": "多沟通，误会很快会消除。",
      "health": "心情舒畅是最好的良药。",
      "wealth": "正财稳定，偏财随缘。"
    }
  }
]"#;

static FALLBACK_POOL: LazyLock<Vec<FortuneRecord>> = LazyLock::new(|| {
    serde_json::from_str(FALLBACK_JSON).expect("embedded fallback pool must be valid")
});

/// The full pool, in declaration order.
#[must_use]
pub fn pool() -> &'static [FortuneRecord] {
    &FALLBACK_POOL
}

/// Draw one fortune uniformly at random from the pool.
#[must_use]
pub fn draw() -> FortuneRecord {
    FALLBACK_POOL[rand::random_range(0..FALLBACK_POOL.len())].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingqian_types::LuckLevel;

    #[test]
    fn pool_parses_and_has_three_entries() {
        assert_eq!(pool().len(), 3);
    }

    #[test]
    fn pool_levels_are_within_the_closed_set() {
        for record in pool() {
            assert!(LuckLevel::ALL.contains(&record.level));
            assert_eq!(record.poem.lines().len(), 2);
        }
    }

    #[test]
    fn draw_returns_a_pool_member() {
        for _ in 0..20 {
            let record = draw();
            assert!(pool().contains(&record));
        }
    }
}
