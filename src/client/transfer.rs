//! Single-file upload and download over the SFTP subsystem.

use super::transport::SshConnection;
use crate::constants::transfer::PROGRESS_INTERVAL_MS;
use crate::errors::{map_ssh_error, ClientError, ClientErrorKind};
use crate::services::logger::Logger;
use crate::utils::progress::ProgressReader;
use crate::utils::user_paths::{base_name, expand_home_path, join_remote};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

/// Remote filesystem operations a transfer needs.
pub trait RemoteFs {
    fn is_dir(&self, path: &str) -> bool;
    fn stat_size(&self, path: &str) -> io::Result<u64>;
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;
    fn create(&self, path: &str) -> io::Result<Box<dyn Write + '_>>;
}

pub trait FileTransport {
    type Fs: RemoteFs;

    fn open_file_transport(&self) -> Result<Self::Fs, ClientError>;
}

pub struct Ssh2Fs {
    sftp: ssh2::Sftp,
}

impl RemoteFs for Ssh2Fs {
    fn is_dir(&self, path: &str) -> bool {
        self.sftp
            .stat(Path::new(path))
            .map(|stat| stat.is_dir())
            .unwrap_or(false)
    }

    fn stat_size(&self, path: &str) -> io::Result<u64> {
        let stat = self.sftp.stat(Path::new(path)).map_err(io::Error::from)?;
        Ok(stat.size.unwrap_or(0))
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let file = self.sftp.open(Path::new(path)).map_err(io::Error::from)?;
        Ok(Box::new(file))
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn Write + '_>> {
        let file = self.sftp.create(Path::new(path)).map_err(io::Error::from)?;
        Ok(Box::new(file))
    }
}

impl FileTransport for SshConnection {
    type Fs = Ssh2Fs;

    fn open_file_transport(&self) -> Result<Ssh2Fs, ClientError> {
        let sftp = self
            .session
            .sftp()
            .map_err(|err| map_ssh_error(ClientErrorKind::Transfer, err))?;
        Ok(Ssh2Fs { sftp })
    }
}

/// Empty destination means "same name"; a directory destination gets the
/// source's base name appended.
pub fn resolve_destination(src: &str, dest: &str, is_dir: impl Fn(&str) -> bool) -> String {
    let name = base_name(src);
    if dest.is_empty() {
        return name.to_string();
    }
    if is_dir(dest) {
        return join_remote(dest, name);
    }
    dest.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub source: String,
    pub destination: String,
    pub bytes: u64,
}

pub struct TransferRunner {
    logger: Logger,
    progress_interval: Duration,
}

impl TransferRunner {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("transfer"),
            progress_interval: Duration::from_millis(PROGRESS_INTERVAL_MS),
        }
    }

    fn fail(&self, message: &str, path: &str, err: impl std::fmt::Display) -> ClientError {
        let err = ClientError::transfer(format!("{} {}: {}", message, path, err));
        self.logger.error(
            message,
            Some(&serde_json::json!({ "path": path, "error": err.to_string() })),
        );
        err
    }

    fn open_fs<T: FileTransport>(&self, transport: &T) -> Result<T::Fs, ClientError> {
        transport.open_file_transport().map_err(|err| {
            self.logger.error(
                "failed to open file transfer session",
                Some(&serde_json::json!({ "error": err.to_string() })),
            );
            ClientError::transfer(err.message)
        })
    }

    pub fn send_file<T, F>(
        &self,
        transport: &T,
        src: &str,
        dest: &str,
        on_progress: F,
    ) -> Result<TransferReport, ClientError>
    where
        T: FileTransport,
        F: FnMut(u64, u64),
    {
        let remote_fs = self.open_fs(transport)?;
        let destination = resolve_destination(src, dest, |path| remote_fs.is_dir(path));
        println!("send file {} to {}", src, destination);

        let local_path = expand_home_path(src);
        let local =
            fs::File::open(&local_path).map_err(|err| self.fail("failed to open", src, err))?;
        let total = local
            .metadata()
            .map_err(|err| self.fail("failed to stat", src, err))?
            .len();
        let mut remote = remote_fs
            .create(&destination)
            .map_err(|err| self.fail("failed to create", &destination, err))?;

        let mut reader = ProgressReader::new(local, total, self.progress_interval, on_progress);
        io::copy(&mut reader, &mut remote)
            .map_err(|err| self.fail("failed to copy to", &destination, err))?;
        remote
            .flush()
            .map_err(|err| self.fail("failed to flush", &destination, err))?;
        Ok(TransferReport {
            source: src.to_string(),
            destination,
            bytes: reader.copied(),
        })
    }

    pub fn get_file<T, F>(
        &self,
        transport: &T,
        src: &str,
        dest: &str,
        on_progress: F,
    ) -> Result<TransferReport, ClientError>
    where
        T: FileTransport,
        F: FnMut(u64, u64),
    {
        let remote_fs = self.open_fs(transport)?;
        let destination = resolve_destination(src, dest, |path| expand_home_path(path).is_dir());
        println!("get file {} to {}", src, destination);

        let total = remote_fs
            .stat_size(src)
            .map_err(|err| self.fail("failed to stat", src, err))?;
        let remote = remote_fs.open(src).map_err(|err| self.fail("failed to open", src, err))?;
        let mut local = fs::File::create(expand_home_path(&destination))
            .map_err(|err| self.fail("failed to create", &destination, err))?;

        let mut reader = ProgressReader::new(remote, total, self.progress_interval, on_progress);
        io::copy(&mut reader, &mut local)
            .map_err(|err| self.fail("failed to copy to", &destination, err))?;
        local
            .flush()
            .map_err(|err| self.fail("failed to flush", &destination, err))?;
        Ok(TransferReport {
            source: src.to_string(),
            destination,
            bytes: reader.copied(),
        })
    }
}
