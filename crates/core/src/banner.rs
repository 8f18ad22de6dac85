//! Block-letter rendering of player counts for chat code blocks.

const FONT_HEIGHT: usize = 7;
const FONT_WIDTH: usize = 5;
const SPACING: usize = 1;
const SHADOW_OFFSET: usize = 1;
const FILL_CHAR: char = '█';
const SHADOW_CHAR: char = '░';

type Glyph = [&'static str; FONT_HEIGHT];

fn glyph(ch: char) -> Glyph {
    match ch {
        '0' => [" ### ", "#   #", "#  ##", "# # #", "##  #", "#   #", " ### "],
        '1' => ["  #  ", " ##  ", "# #  ", "  #  ", "  #  ", "  #  ", "#####"],
        '2' => [" ### ", "#   #", "    #", "   # ", "  #  ", " #   ", "#####"],
        '3' => [" ### ", "#   #", "    #", "  ## ", "    #", "#   #", " ### "],
        '4' => ["   # ", "  ## ", " # # ", "#  # ", "#####", "   # ", "   # "],
        '5' => ["#####", "#    ", "#    ", "#### ", "    #", "#   #", " ### "],
        '6' => [" ### ", "#   #", "#    ", "#### ", "#   #", "#   #", " ### "],
        '7' => ["#####", "    #", "   # ", "  #  ", " #   ", "#    ", "#    "],
        '8' => [" ### ", "#   #", "#   #", " ### ", "#   #", "#   #", " ### "],
        '9' => [" ### ", "#   #", "#   #", " ####", "    #", "#   #", " ### "],
        '/' => ["    #", "   # ", "   # ", "  #  ", " #   ", "#    ", "#    "],
        ',' => ["     ", "     ", "     ", "     ", "  ## ", "  ## ", " #   "],
        ' ' => ["     ", "     ", "     ", "     ", "     ", "     ", "     "],
        _ => [" ### ", "#   #", "    #", "   # ", "  #  ", "     ", "  #  "],
    }
}

/// Group digits in threes: `12345` → `12,345`.
pub fn format_count(value: u32) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (position, digit) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

/// Render `text` as shadowed block letters, one string per row.
///
/// Unsupported characters render as `?`.
pub fn render(text: &str) -> Vec<String> {
    let count = text.chars().count();
    let height = FONT_HEIGHT + SHADOW_OFFSET;
    if count == 0 {
        return vec![String::new(); height];
    }

    let width = count * FONT_WIDTH + (count - 1) * SPACING + SHADOW_OFFSET;
    let mut canvas = vec![vec![' '; width]; height];
    for (index, ch) in text.chars().enumerate() {
        let x_offset = index * (FONT_WIDTH + SPACING);
        for (y, row) in glyph(ch).iter().enumerate() {
            for (x, cell) in row.chars().enumerate() {
                if cell == '#' {
                    paint(&mut canvas, y, x_offset + x);
                }
            }
        }
    }

    canvas
        .into_iter()
        .map(|row| row.into_iter().collect::<String>().trim_end().to_string())
        .collect()
}

fn paint(canvas: &mut [Vec<char>], y: usize, x: usize) {
    let shadow = &mut canvas[y + SHADOW_OFFSET][x + SHADOW_OFFSET];
    if *shadow == ' ' {
        *shadow = SHADOW_CHAR;
    }
    canvas[y][x] = FILL_CHAR;
}

/// Banner for a player count, e.g. `1,024 / 2,000`.
pub fn occupancy_banner(current_players: u32, max_slots: u32) -> String {
    let text = format!(
        "{} / {}",
        format_count(current_players),
        format_count(max_slots)
    );
    render(&text).join("\n")
}
