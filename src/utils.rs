use chrono::NaiveDateTime;

/// Transliterates Cyrillic text to Latin so SMS and WhatsApp templates stay
/// in the GSM character set. Unmapped characters pass through unchanged.
pub fn transliterate(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match transliterate_char(c) {
            Some(mapped) => result.push_str(mapped),
            None => result.push(c),
        }
    }
    result
}

fn transliterate_char(c: char) -> Option<&'static str> {
    let mapped = match c {
        'а' => "a", 'б' => "b", 'в' => "v", 'г' => "g", 'д' => "d",
        'е' => "e", 'ё' => "e", 'ж' => "zh", 'з' => "z", 'и' => "i",
        'й' => "y", 'к' => "k", 'л' => "l", 'м' => "m", 'н' => "n",
        'о' => "o", 'п' => "p", 'р' => "r", 'с' => "s", 'т' => "t",
        'у' => "u", 'ф' => "f", 'х' => "kh", 'ц' => "ts", 'ч' => "ch",
        'ш' => "sh", 'щ' => "shch", 'ъ' => "", 'ы' => "y", 'ь' => "",
        'э' => "e", 'ю' => "yu", 'я' => "ya",
        'А' => "A", 'Б' => "B", 'В' => "V", 'Г' => "G", 'Д' => "D",
        'Е' => "E", 'Ё' => "E", 'Ж' => "Zh", 'З' => "Z", 'И' => "I",
        'Й' => "Y", 'К' => "K", 'Л' => "L", 'М' => "M", 'Н' => "N",
        'О' => "O", 'П' => "P", 'Р' => "R", 'С' => "S", 'Т' => "T",
        'У' => "U", 'Ф' => "F", 'Х' => "Kh", 'Ц' => "Ts", 'Ч' => "Ch",
        'Ш' => "Sh", 'Щ' => "Shch", 'Ъ' => "", 'Ы' => "Y", 'Ь' => "",
        'Э' => "E", 'Ю' => "Yu", 'Я' => "Ya",
        _ => return None,
    };
    Some(mapped)
}

/// Splits the producer's `"DD.MM.YYYY HH:MM"` timestamp into display date and
/// time. A value that does not parse is split on whitespace instead of
/// failing the whole dispatch.
pub fn split_datetime(raw: &str) -> (String, String) {
    match NaiveDateTime::parse_from_str(raw, "%d.%m.%Y %H:%M") {
        Ok(parsed) => (
            parsed.format("%d.%m.%Y").to_string(),
            parsed.format("%H:%M").to_string(),
        ),
        Err(_) => {
            let mut parts = raw.split_whitespace();
            let date = parts.next().unwrap_or(raw).to_string();
            let time = parts.next().unwrap_or("").to_string();
            (date, time)
        }
    }
}
