use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use std::time::Duration;

/// Decodes an encoded image off the async runtime, giving up after `limit`.
pub async fn load_image(bytes: Vec<u8>, limit: Duration) -> Result<DynamicImage> {
    let decode = tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes).context("Failed to decode image")
    });

    match tokio::time::timeout(limit, decode).await {
        Ok(joined) => joined.context("Image decoding task panicked")?,
        Err(_) => Err(anyhow!("Image loading timeout after {:?}", limit)),
    }
}

/// Width divided by height; zero-height images count as square.
pub fn aspect_ratio(image: &DynamicImage) -> f32 {
    if image.height() == 0 {
        1.0
    } else {
        image.width() as f32 / image.height() as f32
    }
}

/// Encodes a solid-colour PNG for tests.
#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    use image::{ImageBuffer, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    let img = ImageBuffer::from_pixel(width, height, Rgb([200u8, 120, 40]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}
