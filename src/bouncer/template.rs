use crate::users::User;

/// Renders a message template for `user`.
///
/// `${login}` and `${name}` are replaced with the user's login and display
/// name; any other `${...}` token renders as nothing. A backslash makes the
/// next character literal. An unterminated `${` is kept as written.
pub fn render(template: &str, user: &User) -> String {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => output.push(escaped),
                None => output.push('\\'),
            },
            '$' if matches!(chars.peek(), Some((_, '{'))) => {
                let rest = &template[index + 2..];
                let Some(end) = rest.find('}') else {
                    output.push_str(&template[index..]);
                    break;
                };
                match &rest[..end] {
                    "login" => output.push_str(&user.login),
                    "name" => output.push_str(user.display_name()),
                    _ => {}
                }
                let resume = index + 2 + end + 1;
                while matches!(chars.peek(), Some((next, _)) if *next < resume) {
                    chars.next();
                }
            }
            _ => output.push(c),
        }
    }
    output
}
