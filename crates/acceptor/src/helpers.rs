//! 日志与名单匹配用的格式化工具

/// 将短通道 ID 渲染为 `区块x交易x输出` 形式，如 `700762x1327x1`
pub fn parse_channel_id(chan_id: u64) -> String {
    let block = chan_id >> 40;
    let tx_index = (chan_id >> 16) & 0xFF_FFFF;
    let output = chan_id & 0xFFFF;
    format!("{}x{}x{}", block, tx_index, output)
}

/// 缩短公钥用于日志：超过 8 个字符时保留首尾各 4 个
pub fn trim_pubkey(pubkey: &str) -> String {
    const N_SPLIT: usize = 8;

    let chars: Vec<char> = pubkey.chars().collect();
    if chars.len() <= N_SPLIT {
        return pubkey.to_string();
    }

    let head: String = chars[..N_SPLIT / 2].iter().collect();
    let tail: String = chars[chars.len() - N_SPLIT / 2..].iter().collect();
    format!("{}..{}", head, tail)
}
