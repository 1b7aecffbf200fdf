// crates/reelqueue-media/src/encode.rs
//
// FfmpegCodec: single-input H.264 + AAC MP4 transcode.
//
// Pipeline per job:
//   open input → pick best video (+ audio when include_audio) →
//   seek to trim start → decode → [crop] → scale to fit max_dimension →
//   encode → mux into a temp .mp4 → copy the finished file into the worker's
//   writer.
//
// MP4 needs a seekable output to write its index, so the muxer writes to a
// temp file and the bytes are handed over only once the trailer is written.
//
// Stream layout in the output MP4:
//   Stream 0: H.264 video (YUV420P, preset bitrate, source frame rate)
//   Stream 1: AAC audio  (FLTP stereo, 44100 Hz, preset bitrate), optional
//
// PTS strategy:
//   Video: frame counter in 1/fps. Audio: sample counter in 1/44100. Both
//   start at zero, so a trimmed output starts at t=0.
//
// Audio FIFO:
//   AAC takes exactly `frame_size()` samples per frame. Decoded PCM is
//   resampled into a stereo FLTP buffer and popped in encoder-sized frames;
//   the tail is zero-padded at the end.
//
// Errors: internals use anyhow. A JobError wrapped inside (NoVideoTrack,
// Cancelled, ...) is recovered by downcast at the Codec boundary; anything
// else becomes JobError::Unknown with the full context chain.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::{Pixel, Sample, input as open_input, output as open_output};
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::media::Type as MediaType;
use ffmpeg::software::scaling::{Context as ScaleCtx, Flags as ScaleFlags};
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

use reelqueue_core::error::JobError;
use reelqueue_core::helpers::geometry::PixelRect;
use reelqueue_core::protocol::{Capabilities, ConvertRequest, MediaInfo};

use crate::codec::{fit_dimensions, Codec, EncodeControl};
use crate::helpers::seek::seek_to_secs;
use crate::helpers::yuv::{clamp_rect, crop_yuv420p, set_square_pixels};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Report progress every this many encoded video frames.
const PROGRESS_INTERVAL: i64 = 15;

/// Output audio sample rate.
const AUDIO_RATE: i32 = 44100;

/// Used when the container does not declare a frame rate.
const FALLBACK_FPS: i32 = 30;

/// Copy block size when handing the finished file to the writer.
const COPY_BLOCK: usize = 1024 * 1024;

// ── FfmpegCodec ───────────────────────────────────────────────────────────────

pub struct FfmpegCodec {
    caps: Capabilities,
}

impl FfmpegCodec {
    /// Initialise FFmpeg and look up the H.264/AAC encoders.
    pub fn new() -> Result<Self> {
        ffmpeg::init().context("initialise FFmpeg")?;
        let caps = Capabilities {
            can_encode_video: encoder::find(CodecId::H264).is_some(),
            can_encode_audio: encoder::find(CodecId::AAC).is_some(),
        };
        info!(video = caps.can_encode_video, audio = caps.can_encode_audio, "FFmpeg encoders probed");
        Ok(Self { caps })
    }
}

impl Codec for FfmpegCodec {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo, JobError> {
        crate::probe::probe_media(path)
    }

    fn transcode(
        &self,
        req: &ConvertRequest,
        ctl: &mut EncodeControl<'_>,
        out: &mut dyn Write,
    ) -> Result<(), JobError> {
        let tmp = tempfile::Builder::new()
            .prefix("reelqueue-")
            .suffix(".mp4")
            .tempfile()?;

        run_transcode(req, tmp.path(), ctl).map_err(into_job_error)?;
        copy_out(tmp.path(), ctl, out).map_err(into_job_error)
    }
}

fn into_job_error(err: anyhow::Error) -> JobError {
    match err.downcast::<JobError>() {
        Ok(job) => job,
        Err(other) => JobError::Unknown(format!("{other:#}")),
    }
}

fn copy_out(path: &Path, ctl: &EncodeControl<'_>, out: &mut dyn Write) -> Result<()> {
    let mut file = File::open(path).with_context(|| format!("reopen '{}'", path.display()))?;
    let mut block = vec![0u8; COPY_BLOCK];
    loop {
        ctl.check()?;
        let n = file.read(&mut block).context("read encoded output")?;
        if n == 0 {
            return Ok(());
        }
        out.write_all(&block[..n])
            .map_err(|e| JobError::stream_write(e.to_string()))?;
    }
}

// ── Audio FIFO ────────────────────────────────────────────────────────────────

/// Stereo FLTP sample buffer. Mono input is duplicated to both channels.
struct AudioFifo {
    left:  Vec<f32>,
    right: Vec<f32>,
}

impl AudioFifo {
    fn new() -> Self { Self { left: Vec::new(), right: Vec::new() } }

    fn len(&self) -> usize { self.left.len() }

    /// Append one FLTP frame (stereo or mono).
    fn push(&mut self, frame: &AudioFrame) {
        let n = frame.samples();
        if n == 0 { return; }
        unsafe {
            let l_bytes = frame.data(0);
            let l_f32 = std::slice::from_raw_parts(l_bytes.as_ptr() as *const f32, n);
            self.left.extend_from_slice(l_f32);

            let r_bytes = if frame.ch_layout().channels() >= 2 { frame.data(1) } else { frame.data(0) };
            let r_f32 = std::slice::from_raw_parts(r_bytes.as_ptr() as *const f32, n);
            self.right.extend_from_slice(r_f32);
        }
    }

    /// Pop `n` samples as one frame, zero-padding a short tail.
    fn pop_frame(&mut self, n: usize, sample_idx: i64) -> AudioFrame {
        let available = self.left.len().min(n);

        let mut frame = AudioFrame::new(
            Sample::F32(SampleType::Planar),
            n,
            ChannelLayoutMask::STEREO,
        );
        frame.set_rate(AUDIO_RATE as u32);
        frame.set_pts(Some(sample_idx));

        unsafe {
            let ldata = frame.data_mut(0);
            let ldst  = std::slice::from_raw_parts_mut(ldata.as_mut_ptr() as *mut f32, n);
            ldst[..available].copy_from_slice(&self.left[..available]);
            if available < n { ldst[available..].fill(0.0); }

            let rdata = frame.data_mut(1);
            let rdst  = std::slice::from_raw_parts_mut(rdata.as_mut_ptr() as *mut f32, n);
            rdst[..available].copy_from_slice(&self.right[..available]);
            if available < n { rdst[available..].fill(0.0); }
        }

        self.left.drain(..available);
        self.right.drain(..available);

        frame
    }
}

// ── Audio encoder state ───────────────────────────────────────────────────────

struct AudioEncState {
    encoder:        ffmpeg::encoder::Audio,
    /// Next output frame's PTS in samples.
    out_sample_idx: i64,
    frame_size:     usize,
    fifo:           AudioFifo,
    resampler:      Option<resampling::Context>,
    audio_tb:       Rational,
    /// Muxer-assigned timebase for stream 1.
    ost_audio_tb:   Rational,
}

impl AudioEncState {
    /// Resample (if needed) and buffer one decoded frame.
    fn push_decoded(&mut self, raw: &AudioFrame) -> Result<()> {
        let target_fmt = Sample::F32(SampleType::Planar);
        let needs_resample = raw.format() != target_fmt
            || raw.rate() != AUDIO_RATE as u32
            || raw.ch_layout().channels() != 2;

        if !needs_resample {
            self.fifo.push(raw);
            return Ok(());
        }

        let rs = match self.resampler {
            Some(ref mut rs) => rs,
            None => {
                // Mono must be declared as MONO or swr misreads the layout.
                let src_layout = if raw.ch_layout().channels() >= 2 {
                    raw.ch_layout()
                } else {
                    ChannelLayout::MONO
                };
                let ctx = resampling::Context::get2(
                    raw.format(), src_layout,            raw.rate(),
                    target_fmt,   ChannelLayout::STEREO, AUDIO_RATE as u32,
                ).context("create audio resampler")?;
                self.resampler.insert(ctx)
            }
        };

        let mut resampled = AudioFrame::empty();
        if rs.run(raw, &mut resampled).is_ok() && resampled.samples() > 0 {
            self.fifo.push(&resampled);
        }
        Ok(())
    }

    /// Encode buffered samples. `flush` also sends the zero-padded tail.
    fn drain_fifo(&mut self, octx: &mut ffmpeg::format::context::Output, flush: bool) -> Result<()> {
        while self.fifo.len() >= self.frame_size || (flush && self.fifo.len() > 0) {
            let frame = self.fifo.pop_frame(self.frame_size, self.out_sample_idx);
            self.out_sample_idx += self.frame_size as i64;

            self.encoder.send_frame(&frame).context("send audio frame to encoder")?;
            self.drain_packets(octx)?;
        }
        Ok(())
    }

    fn drain_packets(&mut self, octx: &mut ffmpeg::format::context::Output) -> Result<()> {
        let mut pkt = Packet::empty();
        while self.encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(1);
            pkt.rescale_ts(self.audio_tb, self.ost_audio_tb);
            pkt.write_interleaved(octx).context("write audio packet")?;
        }
        Ok(())
    }

    fn flush_encoder(&mut self, octx: &mut ffmpeg::format::context::Output) -> Result<()> {
        self.encoder.send_eof().context("send EOF to audio encoder")?;
        self.drain_packets(octx)
    }
}

// ── Video pipeline ────────────────────────────────────────────────────────────

/// decoded frame → [crop] → YUV420P at the output size.
///
/// Without a crop one swscale pass does format conversion and scaling. With a
/// crop the frame is first converted at source size, cropped by plane copy,
/// then scaled.
struct VideoPipeline {
    src_w:   u32,
    src_h:   u32,
    out_w:   u32,
    out_h:   u32,
    crop:    Option<PixelRect>,
    to_src:  Option<ScaleCtx>,
    to_out:  Option<ScaleCtx>,
}

impl VideoPipeline {
    fn new(src_w: u32, src_h: u32, crop: Option<PixelRect>, max_dimension: Option<u32>) -> Self {
        let crop = crop.map(|r| clamp_rect(r, src_w, src_h));
        let (base_w, base_h) = crop.map(|r| (r.width, r.height)).unwrap_or((src_w, src_h));
        let (out_w, out_h) = fit_dimensions(base_w, base_h, max_dimension);
        Self { src_w, src_h, out_w, out_h, crop, to_src: None, to_out: None }
    }

    fn run(&mut self, decoded: &VideoFrame) -> Result<VideoFrame> {
        let mut yuv = VideoFrame::empty();
        match self.crop {
            None => {
                let sc = match self.to_out {
                    Some(ref mut sc) => sc,
                    None => self.to_out.insert(
                        // Display dimensions, not decoded.width/height: H.264
                        // pads the coded height to a multiple of 16.
                        ScaleCtx::get(
                            decoded.format(), self.src_w, self.src_h,
                            Pixel::YUV420P,   self.out_w, self.out_h,
                            ScaleFlags::BILINEAR,
                        ).context("create swscale context")?,
                    ),
                };
                sc.run(decoded, &mut yuv).context("scale video frame")?;
            }
            Some(rect) => {
                let full_sc = match self.to_src {
                    Some(ref mut sc) => sc,
                    None => self.to_src.insert(
                        ScaleCtx::get(
                            decoded.format(), self.src_w, self.src_h,
                            Pixel::YUV420P,   self.src_w, self.src_h,
                            ScaleFlags::BILINEAR,
                        ).context("create swscale context")?,
                    ),
                };
                let mut full = VideoFrame::empty();
                full_sc.run(decoded, &mut full).context("convert video frame")?;
                let cropped = crop_yuv420p(&full, rect);

                let out_sc = match self.to_out {
                    Some(ref mut sc) => sc,
                    None => self.to_out.insert(
                        ScaleCtx::get(
                            Pixel::YUV420P, rect.width,  rect.height,
                            Pixel::YUV420P, self.out_w,  self.out_h,
                            ScaleFlags::BILINEAR,
                        ).context("create crop scaler")?,
                    ),
                };
                out_sc.run(&cropped, &mut yuv).context("scale cropped frame")?;
            }
        }
        set_square_pixels(&mut yuv);
        Ok(yuv)
    }
}

// ── Transcode ─────────────────────────────────────────────────────────────────

fn run_transcode(req: &ConvertRequest, out_path: &Path, ctl: &mut EncodeControl<'_>) -> Result<()> {
    let in_path = &req.input.path;

    // ── Input ─────────────────────────────────────────────────────────────────
    let mut ictx = open_input(in_path)
        .map_err(|e| JobError::UnsupportedInputFormat(format!("{}: {e}", req.input.name)))?;

    let video_stream_idx = ictx
        .streams()
        .best(MediaType::Video)
        .ok_or(JobError::NoVideoTrack)?
        .index();

    let audio_stream_idx: Option<usize> = if req.output.include_audio {
        ictx.streams().best(MediaType::Audio).map(|s| s.index())
    } else {
        None
    };

    let container_secs = (ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64).max(0.0);

    let (in_video_tb, src_w, src_h, fps, mut video_decoder) = {
        let stream = ictx.stream(video_stream_idx).context("video stream vanished")?;
        let params = stream.parameters();
        let (w, h) = unsafe {
            let p = params.as_ptr();
            ((*p).width as u32, (*p).height as u32)
        };
        let rate = stream.avg_frame_rate();
        let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
            rate
        } else {
            Rational::new(FALLBACK_FPS, 1)
        };
        let decoder = codec::context::Context::from_parameters(params)
            .context("video decoder context")?
            .decoder()
            .video()
            .map_err(|e| JobError::UnsupportedInputFormat(format!("video decoder: {e}")))?;
        let (w, h) = if w > 0 && h > 0 { (w, h) } else { (decoder.width(), decoder.height()) };
        (stream.time_base(), w, h, fps, decoder)
    };

    let mut audio_decoder: Option<ffmpeg::decoder::audio::Audio> = None;
    let mut in_audio_tb = Rational::new(1, AUDIO_RATE);
    if let Some(asi) = audio_stream_idx {
        let ast = ictx.stream(asi).context("audio stream vanished")?;
        in_audio_tb = ast.time_base();
        // A broken audio stream costs the audio, not the job.
        match codec::context::Context::from_parameters(ast.parameters())
            .map_err(anyhow::Error::from)
            .and_then(|c| c.decoder().audio().map_err(anyhow::Error::from))
        {
            Ok(dec) => audio_decoder = Some(dec),
            Err(e)  => ctl.warn(format!("audio track skipped: {e}")),
        }
    }

    // ── Trim window ───────────────────────────────────────────────────────────
    let trim = req.edit.and_then(|e| e.trim);
    let start = trim.map(|t| t.start.max(0.0)).unwrap_or(0.0);
    let end   = trim.map(|t| t.end).unwrap_or(f64::INFINITY);
    let span  = if end.is_finite() { end - start } else { container_secs - start };
    seek_to_secs(&mut ictx, start);

    let mut pipeline = VideoPipeline::new(src_w, src_h, req.edit.and_then(|e| e.crop), req.output.max_dimension);
    debug!(
        job = ctl.job_id(),
        src = %format!("{src_w}x{src_h}"),
        out = %format!("{}x{}", pipeline.out_w, pipeline.out_h),
        start, end, "video pipeline"
    );

    // ── Output ────────────────────────────────────────────────────────────────
    let mut octx = open_output(out_path)
        .with_context(|| format!("open output '{}'", out_path.display()))?;

    let frame_tb = Rational::new(fps.denominator(), fps.numerator());

    let h264 = encoder::find(CodecId::H264)
        .ok_or_else(|| JobError::NoEncodableCodec("H.264 encoder not found".into()))?;

    let mut ost_video = octx.add_stream(h264).context("add video stream")?;
    ost_video.set_time_base(frame_tb);

    let mut video_enc = codec::context::Context::new_with_codec(h264)
        .encoder()
        .video()
        .context("create video encoder context")?;
    video_enc.set_width(pipeline.out_w);
    video_enc.set_height(pipeline.out_h);
    video_enc.set_format(Pixel::YUV420P);
    video_enc.set_time_base(frame_tb);
    video_enc.set_frame_rate(Some(fps));
    video_enc.set_bit_rate(req.output.video_bitrate as usize);

    let mut opts = ffmpeg::Dictionary::new();
    opts.set("preset", "fast");

    let mut video_encoder = video_enc
        .open_as_with(h264, opts)
        .map_err(|e| JobError::NoEncodableCodec(format!("open H.264 encoder: {e}")))?;

    // libavcodec resets the SAR during open; set it on the opened context.
    video_encoder.set_aspect_ratio(Rational::new(1, 1));

    // encoder::Video does not implement AsPtr<AVCodecParameters>, so copy the
    // parameters into the stream through FFI.
    unsafe {
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(
            (**(*octx.as_mut_ptr()).streams.add(0)).codecpar,
            video_encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
        );
        if ret < 0 {
            anyhow::bail!("avcodec_parameters_from_context (video) failed: {ret}");
        }
    }

    let mut audio_state = match audio_decoder {
        Some(_) => Some(open_audio_encoder(&mut octx, req.output.audio_bitrate)?),
        None    => None,
    };

    octx.write_header().context("write output header")?;

    // The muxer may change stream time bases in write_header.
    let ost_video_tb = octx.stream(0).context("video output stream")?.time_base();
    if let Some(state) = audio_state.as_mut() {
        state.ost_audio_tb = octx.stream(1).context("audio output stream")?.time_base();
    }

    // ── Packet loop ───────────────────────────────────────────────────────────
    let mut out_frame_idx: i64 = 0;
    let half_frame = 0.5 * f64::from(frame_tb);

    let encode_frame = |yuv: &VideoFrame,
                            video_encoder: &mut ffmpeg::encoder::video::Video,
                            octx: &mut ffmpeg::format::context::Output|
     -> Result<()> {
        video_encoder.send_frame(yuv).context("send video frame to encoder")?;
        let mut pkt = Packet::empty();
        while video_encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(0);
            pkt.rescale_ts(frame_tb, ost_video_tb);
            pkt.write_interleaved(octx).context("write video packet")?;
        }
        Ok(())
    };

    'packet_loop: for result in ictx.packets() {
        let (stream, packet) = result.context("read packet")?;
        ctl.check()?;

        let sidx = stream.index();

        if sidx == video_stream_idx {
            video_decoder.send_packet(&packet).context("send video packet to decoder")?;

            let mut decoded = VideoFrame::empty();
            while video_decoder.receive_frame(&mut decoded).is_ok() {
                let pts_secs = decoded.pts()
                    .map(|pts| pts as f64 * f64::from(in_video_tb))
                    .unwrap_or(0.0);

                if pts_secs < start - half_frame { continue; }
                if pts_secs >= end { break 'packet_loop; }

                let mut yuv = pipeline.run(&decoded)?;
                yuv.set_pts(Some(out_frame_idx));
                yuv.set_kind(decoded.kind());
                encode_frame(&yuv, &mut video_encoder, &mut octx)?;
                out_frame_idx += 1;

                if out_frame_idx % PROGRESS_INTERVAL == 0 {
                    let fraction = if span > 0.0 { (pts_secs - start) / span } else { 0.0 };
                    let written = std::fs::metadata(out_path).map(|m| m.len()).unwrap_or(0);
                    ctl.report(fraction, written);
                }
            }
        } else if Some(sidx) == audio_stream_idx {
            let (Some(adec), Some(state)) = (audio_decoder.as_mut(), audio_state.as_mut()) else {
                continue;
            };
            // A bad audio packet is dropped, not fatal.
            if adec.send_packet(&packet).is_err() { continue; }

            let mut raw = AudioFrame::empty();
            while adec.receive_frame(&mut raw).is_ok() {
                let pts_secs = raw.pts()
                    .map(|pts| pts as f64 * f64::from(in_audio_tb))
                    .unwrap_or(0.0);
                if pts_secs < start - 0.05 || pts_secs >= end { continue; }
                state.push_decoded(&raw)?;
                state.drain_fifo(&mut octx, false)?;
            }
        }
    }

    // ── Drain decoders ────────────────────────────────────────────────────────
    let _ = video_decoder.send_eof();
    let mut decoded = VideoFrame::empty();
    while video_decoder.receive_frame(&mut decoded).is_ok() {
        let pts_secs = decoded.pts()
            .map(|pts| pts as f64 * f64::from(in_video_tb))
            .unwrap_or(0.0);
        if pts_secs >= end { break; }
        if pts_secs < start - half_frame { continue; }
        let mut yuv = pipeline.run(&decoded)?;
        yuv.set_pts(Some(out_frame_idx));
        encode_frame(&yuv, &mut video_encoder, &mut octx)?;
        out_frame_idx += 1;
    }

    if let (Some(adec), Some(state)) = (audio_decoder.as_mut(), audio_state.as_mut()) {
        let _ = adec.send_eof();
        let mut raw = AudioFrame::empty();
        while adec.receive_frame(&mut raw).is_ok() {
            state.push_decoded(&raw)?;
        }
        state.drain_fifo(&mut octx, false)?;
    }

    if out_frame_idx == 0 {
        return Err(JobError::UnsupportedInputFormat("no video frames decoded".into()).into());
    }

    // ── Flush encoders ────────────────────────────────────────────────────────
    video_encoder.send_eof().context("send EOF to video encoder")?;
    let mut pkt = Packet::empty();
    while video_encoder.receive_packet(&mut pkt).is_ok() {
        pkt.set_stream(0);
        pkt.rescale_ts(frame_tb, ost_video_tb);
        pkt.write_interleaved(&mut octx).context("write flush video packet")?;
    }

    if let Some(state) = audio_state.as_mut() {
        state.drain_fifo(&mut octx, true)?;
        state.flush_encoder(&mut octx)?;
    }

    octx.write_trailer().context("write trailer")?;

    let written = std::fs::metadata(out_path).map(|m| m.len()).unwrap_or(0);
    ctl.report(1.0, written);
    info!(job = ctl.job_id(), frames = out_frame_idx, bytes = written, "mux finished");
    Ok(())
}

/// Add stream 1 and open the AAC encoder for it.
fn open_audio_encoder(octx: &mut ffmpeg::format::context::Output, bit_rate: u32) -> Result<AudioEncState> {
    let audio_tb = Rational::new(1, AUDIO_RATE);

    let aac = encoder::find(CodecId::AAC)
        .ok_or_else(|| JobError::NoEncodableCodec("AAC encoder not found".into()))?;

    let mut ost_audio = octx.add_stream(aac).context("add audio stream")?;
    ost_audio.set_time_base(audio_tb);

    let mut audio_enc = codec::context::Context::new_with_codec(aac)
        .encoder()
        .audio()
        .context("create audio encoder context")?;
    audio_enc.set_rate(AUDIO_RATE);
    audio_enc.set_ch_layout(ChannelLayout::STEREO);
    audio_enc.set_format(Sample::F32(SampleType::Planar));
    audio_enc.set_bit_rate(bit_rate as usize);

    let audio_encoder = audio_enc
        .open_as_with(aac, ffmpeg::Dictionary::new())
        .map_err(|e| JobError::NoEncodableCodec(format!("open AAC encoder: {e}")))?;

    let frame_size = (audio_encoder.frame_size() as usize).max(1024);

    unsafe {
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(
            (**(*octx.as_mut_ptr()).streams.add(1)).codecpar,
            audio_encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
        );
        if ret < 0 {
            anyhow::bail!("avcodec_parameters_from_context (audio) failed: {ret}");
        }
    }

    Ok(AudioEncState {
        encoder:        audio_encoder,
        out_sample_idx: 0,
        frame_size,
        fifo:           AudioFifo::new(),
        resampler:      None,
        audio_tb,
        ost_audio_tb:   audio_tb,
    })
}
