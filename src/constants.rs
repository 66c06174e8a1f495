pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const TIMEOUT_SSH_READY_MS: u64 = 10_000;
    pub const KEEPALIVE_INTERVAL_MS: u64 = 10_000;
    pub const LIBSSH2_ERROR_EAGAIN: i32 = -37;
    pub const PUMP_IDLE_SLEEP_MS: u64 = 10;
    pub const PUMP_BUFFER_SIZE: usize = 32 * 1024;
}

pub mod terminal {
    pub const PTY_TERM: &str = "xterm";
    pub const PTY_BAUD: u32 = 14_400;
    pub const RESIZE_POLL_MS: u64 = 1_000;
}

pub mod crypto {
    pub const DEFAULT_CIPHERS: &[&str] = &[
        "aes128-ctr",
        "aes192-ctr",
        "aes256-ctr",
        "aes128-gcm@openssh.com",
        "aes256-gcm@openssh.com",
        "chacha20-poly1305@openssh.com",
    ];

    /// Appended after the defaults so older servers still negotiate.
    pub const LEGACY_CIPHERS: &[&str] = &[
        "aes128-ctr",
        "aes192-ctr",
        "aes256-ctr",
        "aes128-gcm@openssh.com",
        "chacha20-poly1305@openssh.com",
        "arcfour256",
        "arcfour128",
        "arcfour",
        "aes128-cbc",
        "3des-cbc",
        "blowfish-cbc",
        "cast128-cbc",
        "aes192-cbc",
        "aes256-cbc",
    ];

    pub const DEFAULT_KEY_PATH: &str = "~/.ssh/id_rsa";
}

pub mod navigation {
    pub const SELECT_LABEL: &str = "select host";
    pub const PAGE_SIZE: usize = 20;
    pub const BACK_LABEL: &str = "-parent-";
}

pub mod transfer {
    pub const PROGRESS_INTERVAL_MS: u64 = 1_000;
}

pub mod config {
    pub const ENV_CONFIG_PATH: &str = "SSHW_CONFIG";
    pub const CONFIG_FILE_NAMES: &[&str] = &[".sshw", ".sshw.yml", ".sshw.yaml"];
    pub const SSH_CONFIG_PATH: &str = "~/.ssh/config";
}
