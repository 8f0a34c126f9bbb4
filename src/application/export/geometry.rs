//! Unit conversion and page-slicing arithmetic.
//!
//! All physical/pixel conversions go through [`MM_PER_PX`]; the rasterizer is
//! assumed to lay out content at 96 CSS pixels per inch before applying its
//! scale factor.

use serde::Serialize;

use crate::domain::types::Margins;

use super::options::ExportOptions;

/// Millimetres per CSS pixel at 96 DPI.
pub const MM_PER_PX: f64 = 0.264583;

/// Largest enlargement applied when placing a bitmap narrower than the printable width.
pub const MAX_UPSCALE: f64 = 1.5;

const WIDTH_EPSILON_MM: f64 = 0.01;

/// Physical page layout derived from validated options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub margins: Margins,
}

impl PageGeometry {
    pub fn from_options(options: &ExportOptions) -> Self {
        let (page_width_mm, page_height_mm) = options.page_dimensions_mm();
        Self {
            page_width_mm,
            page_height_mm,
            margins: options.margins,
        }
    }

    pub fn content_width_mm(&self) -> f64 {
        self.page_width_mm - self.margins.left - self.margins.right
    }

    pub fn content_height_mm(&self) -> f64 {
        self.page_height_mm - self.margins.top - self.margins.bottom
    }

    /// Printable width expressed in CSS pixels; the content surface is laid out at this width.
    pub fn content_width_px(&self) -> u32 {
        mm_to_px(self.content_width_mm()).round().max(1.0) as u32
    }
}

pub fn mm_to_px(mm: f64) -> f64 {
    mm / MM_PER_PX
}

pub fn px_to_mm(px: f64) -> f64 {
    px * MM_PER_PX
}

/// How bitmap pixels map onto the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Millimetres covered by one bitmap pixel, identical on both axes.
    pub mm_per_bitmap_px: f64,
    /// Rendered width of the bitmap on the page.
    pub image_width_mm: f64,
    /// Left edge of every page image.
    pub offset_x_mm: f64,
    /// Top edge of every page image.
    pub offset_y_mm: f64,
    /// Bitmap rows that fit in one page's printable height.
    pub page_content_height_px: u32,
}

impl Placement {
    /// Compute a uniform placement for a bitmap of `bitmap_width` pixels rasterized at `scale`.
    pub fn compute(geometry: &PageGeometry, bitmap_width: u32, scale: f32) -> Self {
        let content_width_mm = geometry.content_width_mm();
        let natural_mm_per_px = MM_PER_PX / f64::from(scale);
        let natural_width_mm = f64::from(bitmap_width.max(1)) * natural_mm_per_px;
        let fit = (content_width_mm / natural_width_mm).min(MAX_UPSCALE);

        let mm_per_bitmap_px = natural_mm_per_px * fit;
        let image_width_mm = f64::from(bitmap_width.max(1)) * mm_per_bitmap_px;
        let offset_x_mm = if image_width_mm < content_width_mm - WIDTH_EPSILON_MM {
            geometry.margins.left + (content_width_mm - image_width_mm) / 2.0
        } else {
            geometry.margins.left
        };
        let page_content_height_px =
            ((geometry.content_height_mm() / mm_per_bitmap_px).floor() as u32).max(1);

        Self {
            mm_per_bitmap_px,
            image_width_mm,
            offset_x_mm,
            offset_y_mm: geometry.margins.top,
            page_content_height_px,
        }
    }

    pub fn slice_height_mm(&self, slice: &PageSlice) -> f64 {
        f64::from(slice.height) * self.mm_per_bitmap_px
    }
}

/// One page-height band of the full bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageSlice {
    /// 1-based page number.
    pub page: u32,
    pub source_y: u32,
    pub height: u32,
}

/// Cut `total_height` rows into consecutive, gap-free bands of at most `page_height` rows.
pub fn plan_slices(total_height: u32, page_height: u32) -> Vec<PageSlice> {
    let page_height = page_height.max(1);
    let total_pages = total_height.div_ceil(page_height);
    let mut slices = Vec::with_capacity(total_pages as usize);
    let mut source_y = 0u32;
    let mut page = 1u32;
    while source_y < total_height {
        let height = page_height.min(total_height - source_y);
        slices.push(PageSlice {
            page,
            source_y,
            height,
        });
        source_y += height;
        page += 1;
    }
    slices
}
