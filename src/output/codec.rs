//! 编码器标识解析 (Codec identifiers)
//!
//! 配置中的候选既可以是 FourCC (`mp4v`, `avc1`, `XVID` ...),
//! 也可以直接是 FFmpeg 编码器名 (`libx264`, `mpeg4` ...)。

/// FourCC → FFmpeg 编码器名, 按优先级排列
fn fourcc_encoders(fourcc: &str) -> Option<&'static [&'static str]> {
    let encoders: &'static [&'static str] = match fourcc {
        "mp4v" | "fmp4" | "dx50" | "divx" => &["mpeg4"],
        "avc1" | "h264" | "x264" => &["libx264", "libopenh264", "h264"],
        "hvc1" | "hev1" | "hevc" | "h265" => &["libx265", "hevc"],
        "xvid" => &["libxvid", "mpeg4"],
        "mjpg" => &["mjpeg"],
        "vp80" => &["libvpx"],
        "vp90" | "vp09" => &["libvpx-vp9"],
        "av01" => &["libaom-av1", "libsvtav1"],
        _ => return None,
    };
    Some(encoders)
}

/// 一个候选标识可能对应的编码器名 (FourCC 展开, 其余原样)
pub fn encoder_names(id: &str) -> Vec<String> {
    let id = id.trim();
    match fourcc_encoders(&id.to_ascii_lowercase()) {
        Some(names) => names.iter().map(|n| n.to_string()).collect(),
        None => vec![id.to_string()],
    }
}

/// 在本机可用编码器中为候选标识选出第一个匹配项
pub fn resolve_encoder<'a>(id: &str, available: &'a [String]) -> Option<&'a str> {
    encoder_names(id)
        .iter()
        .find_map(|name| available.iter().find(|a| *a == name))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn fourcc_maps_to_ffmpeg_encoders() {
        let ffmpeg = available(&["mpeg4", "libx264", "mjpeg"]);
        assert_eq!(resolve_encoder("mp4v", &ffmpeg), Some("mpeg4"));
        assert_eq!(resolve_encoder("avc1", &ffmpeg), Some("libx264"));
        assert_eq!(resolve_encoder("H264", &ffmpeg), Some("libx264"));
        assert_eq!(resolve_encoder("MJPG", &ffmpeg), Some("mjpeg"));
    }

    #[test]
    fn xvid_falls_back_to_native_mpeg4() {
        let ffmpeg = available(&["mpeg4"]);
        assert_eq!(resolve_encoder("XVID", &ffmpeg), Some("mpeg4"));
    }

    #[test]
    fn h264_prefers_libx264_then_builtin() {
        let ffmpeg = available(&["h264", "mpeg4"]);
        assert_eq!(resolve_encoder("avc1", &ffmpeg), Some("h264"));
    }

    #[test]
    fn encoder_names_pass_through() {
        let ffmpeg = available(&["libx264", "mpeg4"]);
        assert_eq!(resolve_encoder("libx264", &ffmpeg), Some("libx264"));
        assert_eq!(encoder_names(" mpeg4 "), vec!["mpeg4".to_string()]);
    }

    #[test]
    fn unknown_or_missing_encoder_is_none() {
        let ffmpeg = available(&["mpeg4"]);
        assert_eq!(resolve_encoder("avc1", &ffmpeg), None);
        assert_eq!(resolve_encoder("prores_ks", &ffmpeg), None);
    }
}
