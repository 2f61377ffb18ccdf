use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Secrets (SPS_LIPIA_API_KEY, SPS_SMS_HMAC_SECRET) are deliberately left off this list
    const DISPLAY_ENVS: [&str; 17] = [
        "RUST_LOG",
        "SPS_HOST",
        "SPS_PORT",
        "SPS_DATABASE_URL",
        "SPS_LIPIA_BASE_URL",
        "SPS_LIPIA_CALLBACK_URL",
        "SPS_TRUSTED_SMS_SENDER",
        "SPS_SMS_HMAC_CHECKS",
        "SPS_GATEWAY_IP_WHITELIST",
        "SPS_USE_X_FORWARDED_FOR",
        "SPS_USE_FORWARDED",
        "SPS_LOYALTY_THRESHOLD",
        "SPS_LOYALTY_DISCOUNT",
        "SPS_LOYALTY_VALIDITY_WEEKS",
        "SPS_CALLBACK_LOOKUP_ATTEMPTS",
        "SPS_CALLBACK_LOOKUP_DELAY_MS",
        "SPS_STORE_TIMEZONE_OFFSET_HOURS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
