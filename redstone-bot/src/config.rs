//! The configuration for the bot, given from environment variables and lazy initialized
//! when needed.

use std::net::SocketAddr;
use std::time::Duration;
use std::env;

use glam::IVec3;
use once_cell::race::OnceBox;
use once_cell::sync::OnceCell;

use tracing::warn;


/// Return the address of the server to connect to.
///
/// Set with `REDSTONE_ADDR`, defaults to `127.0.0.1:25565`.
pub fn server_addr() -> SocketAddr {
    static ENV: OnceCell<SocketAddr> = OnceCell::new();
    *ENV.get_or_init(|| {
        let default = SocketAddr::from(([127, 0, 0, 1], 25565));
        match env::var("REDSTONE_ADDR") {
            Ok(s) => s.parse().unwrap_or_else(|_| {
                warn!("invalid REDSTONE_ADDR: {s}, using {default}");
                default
            }),
            Err(_) => default,
        }
    })
}

/// Return the username of the bot.
///
/// Set with `REDSTONE_USERNAME`, defaults to `redstone`.
pub fn username() -> &'static str {
    static ENV: OnceBox<String> = OnceBox::new();
    ENV.get_or_init(|| {
        Box::new(env::var("REDSTONE_USERNAME")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "redstone".to_string()))
    })
}

/// Return the time after which an action that is still waiting for the server's answer
/// causes a resynchronization of the windows.
///
/// Set in milliseconds with `REDSTONE_WATCHDOG_MS`, defaults to 5 seconds.
pub fn watchdog() -> Duration {
    static ENV: OnceCell<Duration> = OnceCell::new();
    *ENV.get_or_init(|| {
        let millis = env::var("REDSTONE_WATCHDOG_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(5000);
        Duration::from_millis(millis)
    })
}

/// Return the block the bot should walk to once spawned, if any.
///
/// Set with `REDSTONE_GOAL=x,y,z`, unset by default.
pub fn goal() -> Option<IVec3> {
    static ENV: OnceCell<Option<IVec3>> = OnceCell::new();
    *ENV.get_or_init(|| {
        let s = env::var("REDSTONE_GOAL").ok()?;
        let goal = parse_block_pos(&s);
        if goal.is_none() {
            warn!("invalid REDSTONE_GOAL: {s}");
        }
        goal
    })
}

/// Parse a block position of the form `x,y,z`.
fn parse_block_pos(s: &str) -> Option<IVec3> {
    let mut parts = s.split(',').map(|part| part.trim().parse::<i32>());
    let x = parts.next()?.ok()?;
    let y = parts.next()?.ok()?;
    let z = parts.next()?.ok()?;
    parts.next().is_none().then_some(IVec3::new(x, y, z))
}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn block_pos() {
        assert_eq!(parse_block_pos("1,64,-3"), Some(IVec3::new(1, 64, -3)));
        assert_eq!(parse_block_pos(" 1, 64 , -3 "), Some(IVec3::new(1, 64, -3)));
        assert_eq!(parse_block_pos("1,64"), None);
        assert_eq!(parse_block_pos("1,64,-3,4"), None);
        assert_eq!(parse_block_pos("a,b,c"), None);
    }

}
