use std::path::Path;

use crate::application::ports::{FrameSource, VideoOpenerPort};
use crate::domain::errors::{DomainError, DomainResult};

#[cfg(feature = "video")]
mod reader {
    use anyhow::{Context, Result};
    use ffmpeg_next as ffmpeg;
    use ffmpeg_next::util::error::EAGAIN;
    use ffmpeg_next::{format, frame, media, software::scaling};
    use image::RgbImage;
    use std::path::Path;
    use tracing::{debug, info, warn};

    use crate::application::ports::FrameSource;
    use crate::domain::errors::{DomainError, DomainResult};

    const SCALE_FLAGS: scaling::Flags = scaling::Flags::BILINEAR;

    /// Frames RGB secuenciales de un fichero de vídeo, decodificados bajo
    /// demanda paquete a paquete.
    pub struct VideoFileReader {
        input: format::context::Input,
        stream_index: usize,
        decoder: ffmpeg::decoder::Video,
        scaler: scaling::Context,
        decoded: frame::Video,
        rgb: frame::Video,
        eof_sent: bool,
        frames: u64,
    }

    /// Resultado de pedir un frame al decodificador.
    #[derive(Debug, PartialEq)]
    pub(super) enum Receive {
        Frame,
        NeedInput,
        Drained,
    }

    /// Solo `EAGAIN` antes del EOF significa "faltan paquetes"; cualquier otro
    /// error es un fallo real de decodificación.
    pub(super) fn classify_receive(res: Result<(), ffmpeg::Error>, eof_sent: bool) -> Result<Receive> {
        match res {
            Ok(()) => Ok(Receive::Frame),
            Err(ffmpeg::Error::Eof) => Ok(Receive::Drained),
            Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN && !eof_sent => Ok(Receive::NeedInput),
            Err(e) => Err(anyhow::Error::new(e).context("decoder receive_frame")),
        }
    }

    impl VideoFileReader {
        pub fn open(path: &Path) -> Result<Self> {
            ffmpeg::init().context("failed to initialise FFmpeg")?;

            let input = format::input(&path).context("could not open video file")?;
            let stream = input
                .streams()
                .best(media::Type::Video)
                .context("no video stream found in file")?;
            let stream_index = stream.index();

            let decoder_ctx = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .context("failed to build decoder context")?;
            let decoder = decoder_ctx.decoder().video().context("failed to open video decoder")?;

            let scaler = scaler_for(decoder.format(), decoder.width(), decoder.height())?;

            info!(
                "🎞️  Vídeo abierto: {}x{} [{:?}] {}",
                decoder.width(),
                decoder.height(),
                decoder.format(),
                path.display()
            );

            Ok(Self {
                input,
                stream_index,
                decoder,
                scaler,
                decoded: frame::Video::empty(),
                rgb: frame::Video::empty(),
                eof_sent: false,
                frames: 0,
            })
        }

        fn read(&mut self) -> Result<Option<RgbImage>> {
            loop {
                let res = self.decoder.receive_frame(&mut self.decoded);
                match classify_receive(res, self.eof_sent) {
                    Ok(Receive::Frame) => {
                        self.frames += 1;
                        return self.convert().map(Some);
                    }
                    Ok(Receive::Drained) => return Ok(None),
                    Ok(Receive::NeedInput) => {}
                    Err(e) => {
                        warn!("Error de decodificación tras {} frames: {:#}", self.frames, e);
                        return Err(e);
                    }
                }

                if !self.feed_packet()? {
                    self.decoder.send_eof().context("decoder send_eof")?;
                    self.eof_sent = true;
                    debug!("Contenedor leído por completo, vaciando el decodificador");
                }
            }
        }

        /// Envía el siguiente paquete del stream de vídeo. `false` al final del
        /// fichero; un error de lectura del contenedor se propaga.
        fn feed_packet(&mut self) -> Result<bool> {
            loop {
                let mut packet = ffmpeg::Packet::empty();
                match packet.read(&mut self.input) {
                    Ok(()) => {}
                    Err(ffmpeg::Error::Eof) => return Ok(false),
                    Err(e) => return Err(anyhow::Error::new(e).context("container read failed")),
                }
                if packet.stream() != self.stream_index {
                    continue;
                }
                self.decoder.send_packet(&packet).context("decoder send_packet")?;
                return Ok(true);
            }
        }

        fn convert(&mut self) -> Result<RgbImage> {
            let (w, h) = (self.decoded.width(), self.decoded.height());
            if self.scaler.input().width != w || self.scaler.input().height != h {
                self.scaler = scaler_for(self.decoded.format(), w, h)?;
            }
            self.scaler.run(&self.decoded, &mut self.rgb).context("to-RGB scaling failed")?;

            // Compactar filas (quitar el padding del stride)
            let stride = self.rgb.stride(0);
            let raw = self.rgb.data(0);
            let row_bytes = w as usize * 3;
            let mut data = Vec::with_capacity(row_bytes * h as usize);
            for row in 0..h as usize {
                let start = row * stride;
                data.extend_from_slice(&raw[start..start + row_bytes]);
            }
            RgbImage::from_raw(w, h, data).context("decoded frame has inconsistent size")
        }
    }

    fn scaler_for(src: format::Pixel, w: u32, h: u32) -> Result<scaling::Context> {
        scaling::Context::get(src, w, h, format::Pixel::RGB24, w, h, SCALE_FLAGS)
            .context("failed to create to-RGB scaler")
    }

    impl FrameSource for VideoFileReader {
        fn next_frame(&mut self) -> DomainResult<Option<RgbImage>> {
            self.read()
                .map_err(|e| DomainError::DeviceUnavailable(format!("video decode failed: {e:#}")))
        }
    }

}

#[cfg(feature = "video")]
pub use reader::VideoFileReader;

#[derive(Debug, Clone, Default)]
pub struct FfmpegVideoOpener;

impl VideoOpenerPort for FfmpegVideoOpener {
    #[cfg(feature = "video")]
    fn open_video(&self, path: &Path) -> DomainResult<Box<dyn FrameSource>> {
        if !path.is_file() {
            return Err(DomainError::NotFound(format!("video file {}", path.display())));
        }
        let reader = VideoFileReader::open(path)
            .map_err(|e| DomainError::InvalidInput(format!("{}: {e:#}", path.display())))?;
        Ok(Box::new(reader))
    }

    #[cfg(not(feature = "video"))]
    fn open_video(&self, path: &Path) -> DomainResult<Box<dyn FrameSource>> {
        Err(DomainError::DeviceUnavailable(format!(
            "{}: built without video support (enable the `video` feature)",
            path.display()
        )))
    }
}
