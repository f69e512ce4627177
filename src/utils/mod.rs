pub mod cache;
pub mod debcontrol;
pub mod downloader;
pub mod lock;
#[cfg(test)]
pub mod test_server;
