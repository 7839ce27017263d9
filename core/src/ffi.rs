//! Host capability table.
//!
//! Functions the simulation module imports from `env`: input reads,
//! timing, job submission, audio buffer bookkeeping, file primitives and
//! draw-list recording. Anything touching linear memory bounds-checks
//! against the module's view and fails soft (zero / -1) rather than
//! trapping, matching the thin-wrapper contract of the platform layer.

use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use wasmtime::{Caller, Linker};

use crate::jobs::Job;
use crate::platform::DrawCommand;
use crate::wasm::HostState;

/// Register the capability table with the linker.
pub fn register_host_ffi(linker: &mut Linker<HostState>) -> Result<()> {
    // Input
    linker.func_wrap("env", "button", button)?;
    linker.func_wrap("env", "key", key)?;
    linker.func_wrap("env", "mouse_button", mouse_button)?;
    linker.func_wrap("env", "mouse_x", mouse_x)?;
    linker.func_wrap("env", "mouse_y", mouse_y)?;
    linker.func_wrap("env", "char_code", char_code)?;

    // Timing
    linker.func_wrap("env", "delta_time", delta_time)?;
    linker.func_wrap("env", "elapsed_time", elapsed_time)?;
    linker.func_wrap("env", "tick_count", tick_count)?;

    // Jobs
    linker.func_wrap("env", "job_submit", job_submit)?;

    // Audio
    linker.func_wrap("env", "audio_samples_needed", audio_samples_needed)?;
    linker.func_wrap("env", "audio_overwrite_len", audio_overwrite_len)?;
    linker.func_wrap("env", "audio_submit", audio_submit)?;

    // Files
    linker.func_wrap("env", "file_size", file_size)?;
    linker.func_wrap("env", "file_read", file_read)?;
    linker.func_wrap("env", "file_open", file_open)?;
    linker.func_wrap("env", "file_read_at", file_read_at)?;
    linker.func_wrap("env", "file_close", file_close)?;
    linker.func_wrap("env", "dir_list", dir_list)?;

    // Drawing
    linker.func_wrap("env", "draw_clear", draw_clear)?;
    linker.func_wrap("env", "draw_rect", draw_rect)?;
    linker.func_wrap("env", "draw_sprite", draw_sprite)?;

    // System
    linker.func_wrap("env", "log", log_message)?;
    linker.func_wrap("env", "quit", quit)?;

    Ok(())
}

// === Input ===

/// Named-button flag byte (see `kiln_shared::ButtonState` bits).
fn button(caller: Caller<'_, HostState>, index: u32) -> u32 {
    caller
        .data()
        .input
        .buttons
        .get(index as usize)
        .map(|b| b.flags as u32)
        .unwrap_or(0)
}

fn key(caller: Caller<'_, HostState>, code: u32) -> u32 {
    caller
        .data()
        .input
        .keys
        .get(code as usize)
        .map(|b| b.flags as u32)
        .unwrap_or(0)
}

/// 0 = left, 1 = right.
fn mouse_button(caller: Caller<'_, HostState>, index: u32) -> u32 {
    let input = &caller.data().input;
    let state = match index {
        0 => input.mouse_left,
        1 => input.mouse_right,
        _ => return 0,
    };
    state.flags as u32
}

fn mouse_x(caller: Caller<'_, HostState>) -> f32 {
    caller.data().input.mouse_x
}

fn mouse_y(caller: Caller<'_, HostState>) -> f32 {
    caller.data().input.mouse_y
}

fn char_code(caller: Caller<'_, HostState>) -> u32 {
    caller.data().input.char_code
}

// === Timing ===

fn delta_time(caller: Caller<'_, HostState>) -> f32 {
    caller.data().delta_time
}

fn elapsed_time(caller: Caller<'_, HostState>) -> f32 {
    caller.data().elapsed_time
}

fn tick_count(caller: Caller<'_, HostState>) -> u64 {
    caller.data().tick_count
}

// === Jobs ===

/// Enqueue the installed job handler with an opaque data word.
///
/// Runs on the orchestrator thread (inside `update`), which is the
/// queue's single producer.
fn job_submit(caller: Caller<'_, HostState>, data: u64) {
    let state = caller.data();
    state.jobs.submit(Job {
        run: state.job_handler,
        data,
    });
}

// === Audio ===

fn audio_samples_needed(caller: Caller<'_, HostState>) -> u32 {
    caller.data().sound.region.sample_count
}

fn audio_overwrite_len(caller: Caller<'_, HostState>) -> u32 {
    caller.data().sound.region.overwrite_count
}

/// Stage `sample_count` interleaved multi-channel samples from module
/// memory. Returns the number of samples accepted.
fn audio_submit(mut caller: Caller<'_, HostState>, ptr: u32, sample_count: u32) -> u32 {
    let Some(memory) = caller.data().memory else {
        return 0;
    };
    let accepted = sample_count.min(caller.data().sound.region.sample_count);
    let (mem, state) = memory.data_and_store_mut(&mut caller);

    let words = accepted as usize * state.sound.channel_count as usize;
    let bytes = words * 2;
    let start = ptr as usize;
    let Some(src) = mem.get(start..start + bytes) else {
        return 0;
    };

    state.sound.samples.clear();
    state.sound.samples.reserve(words);
    for chunk in src.chunks_exact(2) {
        state
            .sound
            .samples
            .push(i16::from_le_bytes([chunk[0], chunk[1]]));
    }
    accepted
}

// === Files ===

/// Resolve a module-supplied path under the asset root. Absolute paths
/// and parent components are rejected.
fn sanitize_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative.is_absolute() {
        return None;
    }
    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(resolved)
}

fn path_from_memory(mem: &[u8], ptr: u32, len: u32) -> Option<String> {
    let start = ptr as usize;
    let bytes = mem.get(start..start + len as usize)?;
    std::str::from_utf8(bytes).ok().map(str::to_owned)
}

fn file_size(caller: Caller<'_, HostState>, path_ptr: u32, path_len: u32) -> i64 {
    let Some(memory) = caller.data().memory else {
        return -1;
    };
    let Some(relative) = path_from_memory(memory.data(&caller), path_ptr, path_len) else {
        return -1;
    };
    let Some(path) = sanitize_path(&caller.data().asset_root, &relative) else {
        return -1;
    };
    match std::fs::metadata(path) {
        Ok(meta) => meta.len() as i64,
        Err(_) => -1,
    }
}

/// Read a file into module memory at `dst_ptr`, staging through the
/// scratch arena. Returns bytes written or -1.
fn file_read(
    mut caller: Caller<'_, HostState>,
    path_ptr: u32,
    path_len: u32,
    dst_ptr: u32,
    dst_cap: u32,
) -> i64 {
    let Some(memory) = caller.data().memory else {
        return -1;
    };
    let Some(relative) = path_from_memory(memory.data(&caller), path_ptr, path_len) else {
        return -1;
    };
    let Some(path) = sanitize_path(&caller.data().asset_root, &relative) else {
        return -1;
    };

    let (mem, state) = memory.data_and_store_mut(&mut caller);
    let staged = match state.scratch.read_file(&path) {
        Ok(slice) => slice,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "file_read failed");
            return -1;
        }
    };

    let bytes = state.scratch.get(staged);
    let count = bytes.len().min(dst_cap as usize);
    let start = dst_ptr as usize;
    let Some(dst) = mem.get_mut(start..start + count) else {
        return -1;
    };
    dst.copy_from_slice(&bytes[..count]);
    count as i64
}

/// Open a file under the asset root and return a handle, or -1. Handles
/// index into the store's open-file table; closed slots are reused.
fn file_open(mut caller: Caller<'_, HostState>, path_ptr: u32, path_len: u32) -> i64 {
    let Some(memory) = caller.data().memory else {
        return -1;
    };
    let Some(relative) = path_from_memory(memory.data(&caller), path_ptr, path_len) else {
        return -1;
    };
    let Some(path) = sanitize_path(&caller.data().asset_root, &relative) else {
        return -1;
    };
    let file = match std::fs::File::open(&path) {
        Ok(file) => file,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "file_open failed");
            return -1;
        }
    };

    let files = &mut caller.data_mut().open_files;
    match files.iter().position(Option::is_none) {
        Some(slot) => {
            files[slot] = Some(file);
            slot as i64
        }
        None => {
            files.push(Some(file));
            (files.len() - 1) as i64
        }
    }
}

/// Read up to `dst_cap` bytes from an open handle at `offset` into
/// module memory. Returns bytes read (short at end of file) or -1.
fn file_read_at(
    mut caller: Caller<'_, HostState>,
    handle: i64,
    offset: u64,
    dst_ptr: u32,
    dst_cap: u32,
) -> i64 {
    use std::io::{Read, Seek, SeekFrom};

    let Some(memory) = caller.data().memory else {
        return -1;
    };
    let (mem, state) = memory.data_and_store_mut(&mut caller);
    let Some(file) = usize::try_from(handle)
        .ok()
        .and_then(|h| state.open_files.get_mut(h))
        .and_then(Option::as_mut)
    else {
        return -1;
    };

    let start = dst_ptr as usize;
    let Some(dst) = mem.get_mut(start..start + dst_cap as usize) else {
        return -1;
    };
    if file.seek(SeekFrom::Start(offset)).is_err() {
        return -1;
    }
    match file.read(dst) {
        Ok(count) => count as i64,
        Err(_) => -1,
    }
}

/// Release an open handle. Unknown handles are ignored.
fn file_close(mut caller: Caller<'_, HostState>, handle: i64) {
    if let Ok(h) = usize::try_from(handle)
        && let Some(slot) = caller.data_mut().open_files.get_mut(h)
    {
        *slot = None;
    }
}

/// Write newline-separated entry names of a directory into module
/// memory. Returns bytes written or -1.
fn dir_list(
    mut caller: Caller<'_, HostState>,
    path_ptr: u32,
    path_len: u32,
    dst_ptr: u32,
    dst_cap: u32,
) -> i64 {
    let Some(memory) = caller.data().memory else {
        return -1;
    };
    let Some(relative) = path_from_memory(memory.data(&caller), path_ptr, path_len) else {
        return -1;
    };
    let Some(path) = sanitize_path(&caller.data().asset_root, &relative) else {
        return -1;
    };

    let Ok(entries) = std::fs::read_dir(path) else {
        return -1;
    };
    let mut listing = String::new();
    for entry in entries.flatten() {
        if let Some(name) = entry.file_name().to_str() {
            if !listing.is_empty() {
                listing.push('\n');
            }
            listing.push_str(name);
        }
    }

    let bytes = listing.as_bytes();
    let count = bytes.len().min(dst_cap as usize);
    let mem = memory.data_mut(&mut caller);
    let start = dst_ptr as usize;
    let Some(dst) = mem.get_mut(start..start + count) else {
        return -1;
    };
    dst.copy_from_slice(&bytes[..count]);
    count as i64
}

// === Drawing ===

fn draw_clear(mut caller: Caller<'_, HostState>, r: f32, g: f32, b: f32, a: f32) {
    caller.data_mut().draw_list.push(DrawCommand::Clear {
        color: [r, g, b, a],
    });
}

#[allow(clippy::too_many_arguments)]
fn draw_rect(
    mut caller: Caller<'_, HostState>,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    r: f32,
    g: f32,
    b: f32,
    a: f32,
) {
    caller.data_mut().draw_list.push(DrawCommand::Rect {
        x,
        y,
        w,
        h,
        color: [r, g, b, a],
    });
}

fn draw_sprite(
    mut caller: Caller<'_, HostState>,
    index: u32,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    angle: f32,
) {
    caller.data_mut().draw_list.push(DrawCommand::Sprite {
        index,
        x,
        y,
        w,
        h,
        angle,
    });
}

// === System ===

fn log_message(caller: Caller<'_, HostState>, ptr: u32, len: u32) {
    let Some(memory) = caller.data().memory else {
        return;
    };
    let data = memory.data(&caller);
    let start = ptr as usize;
    if let Some(bytes) = data.get(start..start + len as usize)
        && let Ok(message) = std::str::from_utf8(bytes)
    {
        tracing::info!(target: "sim", "{message}");
    }
}

fn quit(mut caller: Caller<'_, HostState>) {
    caller.data_mut().quit_requested = true;
}
