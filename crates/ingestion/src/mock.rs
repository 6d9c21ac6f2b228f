//! Mock LiDAR 设备
//!
//! 生成合成字节流，用于无真实设备的测试与 `--mock` 模式。

use std::time::Duration;

use contracts::{DecoderConfig, DEFAULT_HEADER};
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Mock 设备配置
#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    /// 发送的帧数
    pub frames: usize,

    pub packet_size: usize,
    pub frame_size: usize,
    pub header: [u8; 2],

    /// 每第 N 帧丢掉序号 1 的包
    pub missing_sequence_every: Option<usize>,

    /// 每第 N 帧把序号 0 包的包头写坏
    pub corrupt_header_every: Option<usize>,

    /// 每第 N 帧之前插入 `noise_len` 字节噪声
    pub noise_every: Option<usize>,
    pub noise_len: usize,

    /// 每帧前加 u32 大端长度前缀
    pub length_prefix: bool,

    /// 帧间发送间隔
    pub frame_interval: Duration,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            frames: 10,
            packet_size: 44,
            frame_size: 8,
            header: DEFAULT_HEADER,
            missing_sequence_every: None,
            corrupt_header_every: None,
            noise_every: None,
            noise_len: 0,
            length_prefix: false,
            frame_interval: Duration::ZERO,
        }
    }
}

impl MockDeviceConfig {
    /// Match the framing of a decoder configuration
    pub fn for_decoder(config: &DecoderConfig) -> Self {
        Self {
            packet_size: config.packet_size,
            frame_size: config.frame_size,
            header: config.header_bytes,
            length_prefix: config.use_length_prefix,
            ..Default::default()
        }
    }
}

/// Mock LiDAR 设备
///
/// 包格式: `header[2] seq reserved payload`，载荷字节为 `(seq * 100 + i) & 0xFF`。
#[derive(Debug, Clone)]
pub struct MockDevice {
    config: MockDeviceConfig,
}

/// Noise filler, never forms a header
const NOISE_BYTE: u8 = 0x55;

impl MockDevice {
    pub fn new(config: MockDeviceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MockDeviceConfig {
        &self.config
    }

    /// Number of frames the device sends intact
    pub fn intact_frames(&self) -> usize {
        (0..self.config.frames)
            .filter(|&frame| !self.is_damaged(frame))
            .count()
    }

    /// One packet with the device's payload pattern
    pub fn packet(&self, sequence: u8) -> Vec<u8> {
        let mut packet = Vec::with_capacity(self.config.packet_size);
        packet.extend_from_slice(&self.config.header);
        packet.push(sequence);
        packet.push(0x00);
        let payload_len = self.config.packet_size.saturating_sub(packet.len());
        packet.extend((0..payload_len).map(|i| (sequence as usize * 100 + i) as u8));
        packet
    }

    /// Bytes for frame `frame`, including noise and prefix
    pub fn frame_bytes(&self, frame: usize) -> Vec<u8> {
        let config = &self.config;
        let mut body = Vec::with_capacity(config.packet_size * config.frame_size);

        for sequence in 0..config.frame_size {
            if sequence == 1 && hits(config.missing_sequence_every, frame) {
                continue;
            }
            let mut packet = self.packet(sequence as u8);
            if sequence == 0 && hits(config.corrupt_header_every, frame) {
                packet[0] = !packet[0];
            }
            body.extend_from_slice(&packet);
        }

        let mut out = Vec::with_capacity(body.len() + config.noise_len + 4);
        if hits(config.noise_every, frame) {
            out.resize(config.noise_len, NOISE_BYTE);
        }
        if config.length_prefix {
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        }
        out.extend_from_slice(&body);
        out
    }

    /// The whole capture as one buffer
    pub fn generate(&self) -> Vec<u8> {
        (0..self.config.frames)
            .flat_map(|frame| self.frame_bytes(frame))
            .collect()
    }

    /// Write the capture frame by frame, pausing `frame_interval` between frames.
    pub async fn stream_to<W>(&self, mut writer: W) -> std::io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        for frame in 0..self.config.frames {
            let bytes = self.frame_bytes(frame);
            writer.write_all(&bytes).await?;
            written += bytes.len() as u64;
            trace!(frame, len = bytes.len(), "mock frame sent");

            if !self.config.frame_interval.is_zero() {
                tokio::time::sleep(self.config.frame_interval).await;
            }
        }
        writer.shutdown().await?;
        debug!(frames = self.config.frames, bytes = written, "mock device finished");
        Ok(written)
    }

    /// Start the device on its own task, returning the read end of the link.
    pub fn spawn(self, link_capacity: usize) -> (DuplexStream, JoinHandle<std::io::Result<u64>>) {
        let (device_end, host_end) = tokio::io::duplex(link_capacity.max(1));
        let handle = tokio::spawn(async move { self.stream_to(device_end).await });
        (host_end, handle)
    }

    fn is_damaged(&self, frame: usize) -> bool {
        hits(self.config.missing_sequence_every, frame)
            || hits(self.config.corrupt_header_every, frame)
    }
}

fn hits(every: Option<usize>, frame: usize) -> bool {
    every.is_some_and(|n| n > 0 && (frame + 1) % n == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_packet_layout() {
        let device = MockDevice::new(MockDeviceConfig::default());
        let packet = device.packet(3);
        assert_eq!(packet.len(), 44);
        assert_eq!(&packet[..4], &[0x0A, 0x00, 0x03, 0x00]);
        assert_eq!(packet[4], 300u16 as u8);
        assert_eq!(packet[5], 301u16 as u8);
    }

    #[test]
    fn test_faults_change_frame_shape() {
        let device = MockDevice::new(MockDeviceConfig {
            frames: 4,
            missing_sequence_every: Some(2),
            noise_every: Some(4),
            noise_len: 10,
            ..Default::default()
        });
        assert_eq!(device.frame_bytes(0).len(), 8 * 44);
        assert_eq!(device.frame_bytes(1).len(), 7 * 44);
        assert_eq!(device.frame_bytes(3).len(), 10 + 7 * 44);
        assert_eq!(device.intact_frames(), 2);
    }

    #[test]
    fn test_length_prefix() {
        let device = MockDevice::new(MockDeviceConfig {
            frames: 1,
            length_prefix: true,
            ..Default::default()
        });
        let bytes = device.generate();
        assert_eq!(&bytes[..4], &352u32.to_be_bytes());
        assert_eq!(bytes.len(), 4 + 352);
    }

    #[tokio::test]
    async fn test_spawned_device_streams_everything() {
        let device = MockDevice::new(MockDeviceConfig {
            frames: 3,
            ..Default::default()
        });
        let expected = device.generate();

        let (mut link, handle) = device.spawn(64);
        let mut received = Vec::new();
        link.read_to_end(&mut received).await.unwrap();

        assert_eq!(handle.await.unwrap().unwrap(), expected.len() as u64);
        assert_eq!(received, expected);
    }
}
