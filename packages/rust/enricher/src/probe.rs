//! Image dimension and format probing.

use imagesize::ImageType;

use newsmirror_shared::{NewsMirrorError, Result};

/// Dimensions and format read from an image header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedImage {
    pub width: u32,
    pub height: u32,
    /// Short lowercase format name (`png`, `jpg`, `gif`, ...).
    pub format: String,
}

/// Probe raw image bytes. Only the header is inspected.
pub fn probe_image(bytes: &[u8]) -> Result<ProbedImage> {
    let kind = imagesize::image_type(bytes)
        .map_err(|e| NewsMirrorError::parse(format!("unrecognized image format: {e}")))?;
    let format = format_name(&kind)
        .ok_or_else(|| NewsMirrorError::parse(format!("unsupported image format {kind:?}")))?;
    let size = imagesize::blob_size(bytes)
        .map_err(|e| NewsMirrorError::parse(format!("unreadable image header: {e}")))?;

    let width = u32::try_from(size.width)
        .map_err(|_| NewsMirrorError::parse(format!("image width {} out of range", size.width)))?;
    let height = u32::try_from(size.height).map_err(|_| {
        NewsMirrorError::parse(format!("image height {} out of range", size.height))
    })?;

    if width == 0 || height == 0 {
        return Err(NewsMirrorError::parse("image has zero dimensions"));
    }

    Ok(ProbedImage {
        width,
        height,
        format: format.to_string(),
    })
}

/// File-extension style name for the formats a preview image can take.
fn format_name(kind: &ImageType) -> Option<&'static str> {
    let name = match kind {
        ImageType::Jpeg => "jpg",
        ImageType::Png => "png",
        ImageType::Gif => "gif",
        ImageType::Webp => "webp",
        ImageType::Bmp => "bmp",
        ImageType::Ico => "ico",
        ImageType::Tiff => "tiff",
        ImageType::Heif(_) => "heif",
        _ => return None,
    };
    Some(name)
}
