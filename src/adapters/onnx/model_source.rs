use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::application::ports::ModelSourcePort;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::ModelSource;

/// Resolución de pesos: primero el fichero local, si no, descarga HTTP(S).
pub struct HttpModelSource {
    client: reqwest::Client,
}

impl HttpModelSource {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Descarga `url` en streaming a `<dest>.part` y lo renombra a `dest` cuando
    /// el cuerpo está completo. El parcial nunca sobrevive a un fallo.
    pub async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        progress: &mut (dyn FnMut(u64, Option<u64>) + Send),
    ) -> Result<()> {
        let parsed = reqwest::Url::parse(url).map_err(|e| anyhow!("invalid model URL {url:?}: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("unsupported URL scheme {:?} (only http and https)", parsed.scheme());
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }

        let part = part_path(dest);
        match self.fetch(parsed, &part, progress).await {
            Ok(()) => {
                if let Err(e) = tokio::fs::rename(&part, dest).await {
                    let _ = tokio::fs::remove_file(&part).await;
                    return Err(e).with_context(|| format!("cannot move download to {}", dest.display()));
                }
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        url: reqwest::Url,
        part: &Path,
        progress: &mut (dyn FnMut(u64, Option<u64>) + Send),
    ) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("request failed")?
            .error_for_status()
            .context("server refused the download")?;

        let total = response.content_length();
        let mut file = tokio::fs::File::create(part)
            .await
            .with_context(|| format!("cannot write {}", part.display()))?;

        let mut done: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("connection dropped during download")?;
            file.write_all(&chunk).await.context("disk write failed")?;
            done += chunk.len() as u64;
            progress(done, total);
        }
        file.flush().await.context("disk write failed")?;

        if let Some(expected) = total {
            if done != expected {
                bail!("download truncated: got {done} of {expected} bytes");
            }
        }
        if done == 0 {
            bail!("server returned an empty body");
        }
        Ok(())
    }
}

impl Default for HttpModelSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelSourcePort for HttpModelSource {
    async fn ensure_local(&self, source: &ModelSource) -> DomainResult<PathBuf> {
        let path = &source.local_path;
        if path.as_os_str().is_empty() {
            return Err(DomainError::InvalidInput("model path is empty".into()));
        }
        if path.is_file() {
            info!("📦 Usando modelo local {}", path.display());
            return Ok(path.clone());
        }

        info!("⬇️  Modelo no encontrado en {}, descargando desde {}", path.display(), source.remote_url);
        let mut tracker = DownloadProgress::default();
        let mut report = |done: u64, total: Option<u64>| {
            if let Some(pct) = tracker.update(done, total) {
                info!("   descarga {:>3}%", pct);
            }
        };

        match self.download_to(&source.remote_url, path, &mut report).await {
            Ok(()) => {
                info!("✅ Modelo guardado en {}", path.display());
                Ok(path.clone())
            }
            Err(e) => {
                warn!("Falló la descarga del modelo: {:#}", e);
                Err(DomainError::ModelUnavailable(format!(
                    "{e:#}. Place the weights file at {} or point --model-url (HELMET_MODEL_URL) at a reachable copy",
                    path.display()
                )))
            }
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut s = OsString::from(dest.as_os_str());
    s.push(".part");
    PathBuf::from(s)
}

/// Emite un porcentaje cada vez que la descarga cruza un escalón del 10%.
#[derive(Debug, Default)]
struct DownloadProgress {
    last_step: Option<u64>,
}

impl DownloadProgress {
    fn update(&mut self, done: u64, total: Option<u64>) -> Option<u64> {
        let total = total.filter(|t| *t > 0)?;
        let step = (done.min(total) * 100 / total) / 10;
        if self.last_step == Some(step) {
            return None;
        }
        self.last_step = Some(step);
        Some(step * 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::net::SocketAddr;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn weights() -> Vec<u8> {
        (0..50_000u32).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn progress_reports_each_step_once() {
        let mut p = DownloadProgress::default();
        assert_eq!(p.update(0, Some(1000)), Some(0));
        assert_eq!(p.update(50, Some(1000)), None);
        assert_eq!(p.update(120, Some(1000)), Some(10));
        assert_eq!(p.update(1000, Some(1000)), Some(100));
        assert_eq!(p.update(10, None), None);
    }

    #[tokio::test]
    async fn downloads_exact_bytes_and_reaches_100_percent() {
        let body = weights();
        let served = body.clone();
        let addr = serve(Router::new().route("/best.onnx", get(move || async move { served }))).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("models/helmet.onnx");
        let mut last = (0, None);
        let mut record = |done: u64, total: Option<u64>| last = (done, total);

        HttpModelSource::new()
            .download_to(&format!("http://{addr}/best.onnx"), &dest, &mut record)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!part_path(&dest).exists());
        assert_eq!(last, (body.len() as u64, Some(body.len() as u64)));
        assert_eq!(DownloadProgress::default().update(last.0, last.1), Some(100));
    }

    #[tokio::test]
    async fn not_found_leaves_no_file() {
        let addr = serve(Router::new()).await;
        let dir = tempfile::tempdir().unwrap();
        let source = ModelSource {
            local_path: dir.path().join("helmet.onnx"),
            remote_url: format!("http://{addr}/missing.onnx"),
        };

        let res = HttpModelSource::new().ensure_local(&source).await;
        assert!(matches!(res, Err(DomainError::ModelUnavailable(_))));
        assert!(!source.local_path.exists());
        assert!(!part_path(&source.local_path).exists());
    }

    #[tokio::test]
    async fn unreachable_source_leaves_no_file() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let source = ModelSource {
            local_path: dir.path().join("helmet.onnx"),
            remote_url: format!("http://{addr}/best.onnx"),
        };

        match HttpModelSource::new().ensure_local(&source).await {
            Err(DomainError::ModelUnavailable(msg)) => assert!(msg.contains("HELMET_MODEL_URL")),
            other => panic!("expected ModelUnavailable, got {other:?}"),
        }
        assert!(!source.local_path.exists());
        assert!(!part_path(&source.local_path).exists());
    }

    #[tokio::test]
    async fn existing_local_file_skips_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("helmet.onnx");
        std::fs::write(&local, b"weights").unwrap();
        let source = ModelSource { local_path: local.clone(), remote_url: "http://127.0.0.1:9/never".into() };

        let path = HttpModelSource::new().ensure_local(&source).await.unwrap();
        assert_eq!(path, local);
        assert_eq!(std::fs::read(&local).unwrap(), b"weights");
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let dir = tempfile::tempdir().unwrap();
        for url in ["", "ftp://example.com/best.onnx", "file:///tmp/best.onnx"] {
            let source = ModelSource { local_path: dir.path().join("m.onnx"), remote_url: url.into() };
            let res = HttpModelSource::new().ensure_local(&source).await;
            assert!(matches!(res, Err(DomainError::ModelUnavailable(_))), "{url}");
        }
        assert!(!dir.path().join("m.onnx").exists());
    }
}
