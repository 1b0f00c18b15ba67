use hookrelay_core::config::SignalConfig;
use hookrelay_core::signal::entity::{FlagUpdate, ReportedSide};
use hookrelay_core::strategy::entity::Strategy;
use rust_decimal::Decimal;
use std::str::FromStr;

/// 入站记录的字段数：`[exchange, symbol, side, price, direction, amount]`
pub const FIELD_COUNT: usize = 6;

/// 标的截断标记，标的在其第一次出现之后被截断
const SYMBOL_MARKER: &str = "USDT";

/// # Summary
/// 信号校验与出站载荷的可配置规则。
#[derive(Debug, Clone)]
pub struct SignalRules {
    /// 是否要求交易所字段与策略一致
    pub validate_exchange: bool,
    pub safe_interval: u64,
    pub version: String,
}

impl From<&SignalConfig> for SignalRules {
    fn from(cfg: &SignalConfig) -> Self {
        Self {
            validate_exchange: cfg.validate_exchange,
            safe_interval: cfg.safe_interval,
            version: cfg.version.clone(),
        }
    }
}

impl Default for SignalRules {
    fn default() -> Self {
        Self::from(&SignalConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
}

/// # Summary
/// 通过全部校验的入站信号。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignal {
    pub exchange: String,
    pub symbol: String,
    pub side: ReportedSide,
    pub price: Decimal,
    pub direction: Direction,
    pub amount: Decimal,
}

impl ParsedSignal {
    /// # Summary
    /// 转换为对应信号源的持仓标志更新。
    ///
    /// # Logic
    /// `opened = side == Flat ? false : amount > 0`。
    pub fn flag_update(&self, source_id: &str) -> FlagUpdate {
        let opened = match self.side {
            ReportedSide::Flat => false,
            _ => self.amount > Decimal::ZERO,
        };
        FlagUpdate {
            source_id: source_id.to_string(),
            side: self.side,
            opened,
        }
    }
}

/// # Summary
/// 从原始标的字段中提取标的。
///
/// # Logic
/// 1. 转为大写。
/// 2. 在第一次出现 `USDT` 之后截断 (如 `BTCUSDTPERP` → `BTCUSDT`)。
/// 3. 不含 `USDT` 时返回 `None`，调用方应静默丢弃该事件。
pub fn extract_symbol(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    let pos = upper.find(SYMBOL_MARKER)?;
    Some(upper[..pos + SYMBOL_MARKER.len()].to_string())
}

/// 方向字段取大小写折叠后的最后一个空白分隔词，如 `"Strategy position: LONG"` → `long`
fn parse_side(raw: &str) -> Result<ReportedSide, String> {
    let folded = raw.to_lowercase();
    let token = folded.split_whitespace().last().unwrap_or_default();
    token
        .parse::<ReportedSide>()
        .map_err(|_| format!("invalid side: {:?}", raw))
}

/// `Decimal` 接受 `_` 分隔符，入站数字不允许
fn parse_number(name: &str, raw: &str) -> Result<Decimal, String> {
    if raw.contains('_') {
        return Err(format!("invalid {}: {:?} is not a number", name, raw));
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| format!("invalid {}: {:?} is not a number", name, raw))
}

/// # Summary
/// 解析并校验一条入站信号。
///
/// # Logic
/// 1. 按逗号切分并去除首尾空白，字段不足 6 个直接拒绝。
/// 2. 提取标的；缺少 `USDT` 标记时返回 `Ok(None)` (静默丢弃，不改变任何状态)。
/// 3. 逐项校验方向、价格 (> 0)、买卖方向 (`buy`/`sell`)、数量 (>= 0)，收集所有错误。
/// 4. 交叉校验：`amount > 0` 与 `side == flat` 互相矛盾。
/// 5. 标的必须与策略一致；按规则决定是否校验交易所。
///
/// # Arguments
/// * `raw` - 请求体原文。
/// * `strategy` - 目标策略 (提供 exchange / symbol 身份字段)。
/// * `rules` - 校验规则。
///
/// # Returns
/// * `Ok(Some(ParsedSignal))` - 校验通过。
/// * `Ok(None)` - 标的不含 `USDT`，丢弃。
/// * `Err(Vec<String>)` - 全部校验错误。
pub fn parse_signal(
    raw: &str,
    strategy: &Strategy,
    rules: &SignalRules,
) -> Result<Option<ParsedSignal>, Vec<String>> {
    let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
    if fields.len() < FIELD_COUNT {
        return Err(vec![format!(
            "missing required fields: expected {} comma separated fields, got {}",
            FIELD_COUNT,
            fields.len()
        )]);
    }

    let Some(symbol) = extract_symbol(fields[1]) else {
        return Ok(None);
    };

    let mut errors = Vec::new();

    let side = parse_side(fields[2]).map_err(|e| errors.push(e)).ok();

    let price = match parse_number("price", fields[3]) {
        Ok(p) if p > Decimal::ZERO => Some(p),
        Ok(p) => {
            errors.push(format!("invalid price: {} must be greater than 0", p));
            None
        }
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let direction = match fields[4] {
        "buy" => Some(Direction::Buy),
        "sell" => Some(Direction::Sell),
        other => {
            errors.push(format!("invalid direction: {:?} must be buy or sell", other));
            None
        }
    };

    let amount = match parse_number("amount", fields[5]) {
        Ok(a) if a >= Decimal::ZERO => Some(a),
        Ok(a) => {
            errors.push(format!("invalid amount: {} must not be negative", a));
            None
        }
        Err(e) => {
            errors.push(e);
            None
        }
    };

    if side == Some(ReportedSide::Flat) && amount.is_some_and(|a| a > Decimal::ZERO) {
        errors.push("contradictory signal: flat side with a positive amount".to_string());
    }

    if symbol != strategy.symbol {
        errors.push(format!(
            "symbol mismatch: got {}, strategy trades {}",
            symbol, strategy.symbol
        ));
    }

    let exchange = fields[0].to_lowercase();
    if rules.validate_exchange && exchange != strategy.exchange {
        errors.push(format!(
            "exchange mismatch: got {}, strategy trades on {}",
            exchange, strategy.exchange
        ));
    }

    match (side, price, direction, amount) {
        (Some(side), Some(price), Some(direction), Some(amount)) if errors.is_empty() => {
            Ok(Some(ParsedSignal {
                exchange,
                symbol,
                side,
                price,
                direction,
                amount,
            }))
        }
        _ => Err(errors),
    }
}
