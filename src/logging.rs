use tracing_subscriber::EnvFilter;

/// 安装 fmt 订阅者：若无 RUST_LOG 则默认 info
///
/// 宿主程序已经装过全局订阅者时什么也不做。
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
