// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading RGB-D images from disk.

use byteorder::{BigEndian, ReadBytesExt};
use nalgebra::DMatrix;
use std::{fs::File, io::Cursor, path::Path};

use crate::misc::interop;

/// Read a 16 bit gray png image from a file.
/// Returns `(width, height, pixels)`, pixels in row major order.
pub fn read_png_16bits<P: AsRef<Path>>(
    file_path: P,
) -> Result<(usize, usize, Vec<u16>), png::DecodingError> {
    // Load 16 bits PNG depth image.
    let img_file = File::open(file_path)?;
    let mut decoder = png::Decoder::new(img_file);
    // Use the IDENTITY transformation because by default
    // it will use STRIP_16 which only keep 8 bits.
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info()?;
    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buffer)?;

    // Transform buffer into 16 bits slice.
    let (width, height) = (info.width as usize, info.height as usize);
    let mut buffer_u16 = vec![0; width * height];
    let mut buffer_cursor = Cursor::new(buffer);
    buffer_cursor.read_u16_into::<BigEndian>(&mut buffer_u16)?;

    // Return u16 buffer.
    Ok((width, height, buffer_u16))
}

/// Read a 16 bit depth png image into a `(rows, cols)` matrix.
pub fn read_depth_image<P: AsRef<Path>>(file_path: P) -> Result<DMatrix<u16>, png::DecodingError> {
    let (width, height, pixels) = read_png_16bits(file_path)?;
    Ok(DMatrix::from_row_slice(height, width, &pixels))
}

/// Read an image of any format supported by the `image` crate, converted to gray levels.
pub fn read_gray_image<P: AsRef<Path>>(file_path: P) -> Result<DMatrix<u8>, image::ImageError> {
    Ok(interop::matrix_from_image(image::open(file_path)?.into_luma8()))
}

// TESTS #############################################################
